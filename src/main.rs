//! quantgrid CLI
//!
//! Fetches historical perpetual-futures candles into a local cache, runs
//! the stat-arb backtest with a text report, and replays the
//! Bollinger-grid market-making controller over cached data.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use quantgrid::api::CandleClient;
use quantgrid::backtest::{BacktestConfig, Backtester, GridReplay};
use quantgrid::db::Database;
use quantgrid::models::{symmetric_grid, CandleSeries};
use quantgrid::trading::{GridController, GridControllerConfig, StatArb, StatArbConfig};

/// Grid market-making and stat-arb research CLI.
#[derive(Parser)]
#[command(name = "quantgrid")]
#[command(about = "Backtest stat-arb and grid market-making strategies on perpetual futures", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(
        short,
        long,
        default_value = "sqlite:./quantgrid.db?mode=rwc",
        env = "QUANTGRID_DATABASE"
    )]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download candles into the local cache
    Fetch {
        /// Trading pairs, comma separated (e.g. ETH-USDT,BTC-USDT)
        #[arg(short, long, default_value = "ETH-USDT")]
        pairs: String,

        /// Candle interval (1m, 5m, 15m, 1h, 4h, 1d)
        #[arg(short, long, default_value = "1h")]
        interval: String,

        /// How many days back to fetch
        #[arg(short, long, default_value = "30")]
        days: i64,
    },

    /// Run the stat-arb backtest and print the report
    Backtest {
        /// Trading pair
        #[arg(short, long, default_value = "ETH-USDT")]
        pair: String,

        /// Candle interval
        #[arg(short, long, default_value = "1h")]
        interval: String,

        /// Rolling window for the z-score
        #[arg(long, default_value = "24")]
        periods: usize,

        /// Z-score magnitude required to enter
        #[arg(long, default_value = "1.5")]
        deviation: f64,

        /// Quote amount per position
        #[arg(long, default_value = "50")]
        order_amount: f64,

        /// Position leverage
        #[arg(long, default_value = "20")]
        leverage: u32,

        /// Initial portfolio value
        #[arg(long, default_value = "100")]
        initial_portfolio: f64,

        /// Take-profit distance in units of returns-std
        #[arg(long, default_value = "3.0")]
        take_profit: f64,

        /// Stop-loss distance in units of returns-std
        #[arg(long, default_value = "1.5")]
        stop_loss: f64,

        /// Maximum holding time in seconds
        #[arg(long, default_value = "86400")]
        time_limit: i64,

        /// Window for the barrier-scaling returns-std (defaults to periods)
        #[arg(long)]
        std_span: Option<usize>,

        /// Taker fee rate
        #[arg(long, default_value = "0.0004")]
        fee: f64,

        /// Write the full report (positions + equity curve) as JSON
        #[arg(long)]
        export: Option<std::path::PathBuf>,
    },

    /// Replay the Bollinger-grid controller over cached candles
    Grid {
        /// Trading pair
        #[arg(short, long, default_value = "ETH-USDT")]
        pair: String,

        /// Candle interval
        #[arg(short, long, default_value = "1h")]
        interval: String,

        /// Grid levels per side
        #[arg(long, default_value = "3")]
        levels: u32,

        /// Quote amount per level
        #[arg(long, default_value = "50")]
        amount: f64,

        /// Taker fee rate
        #[arg(long, default_value = "0.0004")]
        fee: f64,
    },

    /// Show the effective default configuration
    Config,

    /// List saved backtest runs
    Runs {
        /// Maximum runs to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db = Database::new(&cli.database).await?;

    match cli.command {
        Commands::Fetch {
            pairs,
            interval,
            days,
        } => {
            let pairs: Vec<String> = pairs
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();

            info!(pairs = ?pairs, interval = %interval, days = days, "Fetching candles");

            let client = CandleClient::new()?;
            let start = Utc::now() - Duration::days(days);
            let end = Utc::now();

            // Fetch all pairs concurrently, store sequentially
            let fetches = pairs
                .iter()
                .map(|pair| client.get_candles(pair, &interval, start, end));
            let results = futures::future::join_all(fetches).await;

            for (pair, result) in pairs.iter().zip(results) {
                match result {
                    Ok(series) => {
                        let written = db.save_candles(&series).await?;
                        println!("{}: cached {} candles ({})", pair, written, interval);
                    }
                    Err(e) => {
                        tracing::error!(pair = %pair, error = %e, "Fetch failed");
                        println!("{}: fetch failed ({})", pair, e);
                    }
                }
            }
        }

        Commands::Backtest {
            pair,
            interval,
            periods,
            deviation,
            order_amount,
            leverage,
            initial_portfolio,
            take_profit,
            stop_loss,
            time_limit,
            std_span,
            fee,
            export,
        } => {
            let series = load_candles(&db, &pair, &interval).await?;

            println!("\n=== Stat-Arb Backtest ===");
            println!("Pair:      {} ({})", pair, interval);
            println!("Candles:   {}", series.len());
            println!("Periods:   {}", periods);
            println!("Deviation: {}", deviation);
            println!("Leverage:  {}x", leverage);

            let strategy = StatArb::new(StatArbConfig {
                trading_pair: pair.clone(),
                periods,
                deviation_threshold: deviation,
            });

            let backtest_config = BacktestConfig {
                order_amount: Decimal::try_from(order_amount)?,
                leverage,
                initial_portfolio: Decimal::try_from(initial_portfolio)?,
                take_profit_multiplier: take_profit,
                stop_loss_multiplier: stop_loss,
                time_limit,
                std_span,
                fee_rate: Decimal::try_from(fee)?,
            };

            let backtester = Backtester::new(backtest_config, strategy);
            let report = backtester.run(&series)?;
            println!("{}", report);

            // Breakdown by close reason
            let breakdown = report.close_reason_breakdown();
            if !breakdown.is_empty() {
                println!("\n--- Positions by Close Reason ---");
                for (reason, count, pnl) in breakdown {
                    println!("  {:<15} {:>4} positions  ${:.4}", reason.as_str(), count, pnl);
                }
            }

            // Best and worst positions
            if !report.positions.is_empty() {
                let mut sorted = report.positions.clone();
                sorted.sort_by(|a, b| {
                    b.pnl_quote
                        .partial_cmp(&a.pnl_quote)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                println!("\n--- Top 5 Winners ---");
                for position in sorted.iter().take(5) {
                    println!(
                        "  {} {} @ {:.2} -> {:.2} | P&L: ${:.4} ({})",
                        position.side.as_str(),
                        position.trading_pair,
                        position.entry_price,
                        position.exit_price,
                        position.pnl_quote,
                        position.close_reason.as_str()
                    );
                }

                println!("\n--- Top 5 Losers ---");
                for position in sorted.iter().rev().take(5) {
                    if position.pnl_quote < Decimal::ZERO {
                        println!(
                            "  {} {} @ {:.2} -> {:.2} | P&L: ${:.4} ({})",
                            position.side.as_str(),
                            position.trading_pair,
                            position.entry_price,
                            position.exit_price,
                            position.pnl_quote,
                            position.close_reason.as_str()
                        );
                    }
                }
            }

            if let Some(path) = export {
                std::fs::write(&path, report.to_json()?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("\nReport exported to {}", path.display());
            }

            let run_id = db.save_backtest_run(&report).await?;
            info!(run_id = run_id, "Backtest run saved");
        }

        Commands::Grid {
            pair,
            interval,
            levels,
            amount,
            fee,
        } => {
            let series = load_candles(&db, &pair, &interval).await?;

            let config = GridControllerConfig {
                trading_pair: pair.clone(),
                order_levels: symmetric_grid(levels, Decimal::try_from(amount)?),
                ..Default::default()
            };

            println!("\n=== Grid Controller Replay ===");
            println!("Pair:      {} ({})", pair, interval);
            println!("Candles:   {}", series.len());
            println!("Levels:    {} per side", levels);
            println!("BB:        length {} / long < {} / short > {}",
                config.bb_length, config.bb_long_threshold, config.bb_short_threshold);
            println!("NATR:      length {}", config.natr_length);

            let replay = GridReplay::new(GridController::new(config), Decimal::try_from(fee)?);
            let report = replay.run(&series)?;
            println!("{}", report);
        }

        Commands::Config => {
            let grid = GridControllerConfig::default();
            let stat_arb = StatArbConfig::default();
            let backtest = BacktestConfig::default();

            println!("\n=== Grid Controller ===\n");
            println!("Strategy:             {}", grid.strategy_name);
            println!("Exchange:             {}", grid.exchange);
            println!("Trading Pair:         {}", grid.trading_pair);
            println!("Leverage:             {}x", grid.leverage);
            println!("BB Length:            {}", grid.bb_length);
            println!("BB Std:               {}", grid.bb_std);
            println!("BB Long Threshold:    {}", grid.bb_long_threshold);
            println!("BB Short Threshold:   {}", grid.bb_short_threshold);
            println!("NATR Length:          {}", grid.natr_length);
            println!("Order Levels:         {}", grid.order_levels.len());
            for level in &grid.order_levels {
                println!(
                    "  {:<7} ${} @ spread x{} (refresh {}s, cooldown {}s)",
                    level.tag(),
                    level.order_amount_quote,
                    level.spread_factor,
                    level.order_refresh_time,
                    level.cooldown_time
                );
            }

            println!("\n=== Stat-Arb Strategy ===\n");
            println!("Trading Pair:         {}", stat_arb.trading_pair);
            println!("Periods:              {}", stat_arb.periods);
            println!("Deviation Threshold:  {}", stat_arb.deviation_threshold);

            println!("\n=== Backtest ===\n");
            println!("Order Amount:         ${}", backtest.order_amount);
            println!("Leverage:             {}x", backtest.leverage);
            println!("Initial Portfolio:    ${}", backtest.initial_portfolio);
            println!("Take Profit:          {} x returns-std", backtest.take_profit_multiplier);
            println!("Stop Loss:            {} x returns-std", backtest.stop_loss_multiplier);
            println!("Time Limit:           {}s", backtest.time_limit);
            println!("Fee Rate:             {}%", backtest.fee_rate * dec!(100));
        }

        Commands::Runs { limit } => {
            let runs = db.get_backtest_runs(limit).await?;

            if runs.is_empty() {
                println!("No saved runs. Use 'quantgrid backtest' to create one.");
                return Ok(());
            }

            println!(
                "\n{:>4} {:<10} {:<5} {:<20} {:>10} {:>8} {:>7} {:>7}",
                "ID", "PAIR", "INT", "CREATED", "PNL", "RETURN%", "WIN%", "SHARPE"
            );
            println!("{}", "-".repeat(80));

            for run in runs {
                println!(
                    "{:>4} {:<10} {:<5} {:<20} {:>10.4} {:>7.2}% {:>6.1}% {:>7.2}",
                    run.id,
                    run.trading_pair,
                    run.interval,
                    &run.created_at[..run.created_at.len().min(19)],
                    run.net_pnl,
                    run.return_pct * 100.0,
                    run.win_rate * 100.0,
                    run.sharpe_ratio
                );
            }
        }
    }

    Ok(())
}

/// Load candles cache-first, falling back to a network fetch for the last
/// 30 days when the cache is empty.
async fn load_candles(db: &Database, pair: &str, interval: &str) -> Result<CandleSeries> {
    let cached = db.get_candles(pair, interval, None, None).await?;
    if !cached.is_empty() {
        info!(pair = %pair, candles = cached.len(), "Loaded candles from cache");
        return Ok(cached);
    }

    info!(pair = %pair, "Cache empty, fetching from exchange");
    let client = CandleClient::new()?;
    let series = client
        .get_candles(pair, interval, Utc::now() - Duration::days(30), Utc::now())
        .await
        .context("Failed to fetch candles")?;

    anyhow::ensure!(
        !series.is_empty(),
        "No candles available for {} {}",
        pair,
        interval
    );

    db.save_candles(&series).await?;
    Ok(series)
}
