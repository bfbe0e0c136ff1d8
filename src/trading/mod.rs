//! Trading logic: grid controller, stat-arb strategy, simulated executor.

mod executor;
mod grid_controller;
mod stat_arb;

pub use executor::{ExecutorStatus, PositionExecutor};
pub use grid_controller::{GridController, GridControllerConfig, ProcessedTick};
pub use stat_arb::{Signal, StatArb, StatArbConfig};
