//! Backtesting engine: configuration, limits, and the candle loop.
//!
//! The engine consumes fully materialized candles (no I/O inside the loop),
//! drives the scheduler and simulator, and calls the strategy through
//! [`StrategyPort`](crate::strategy::StrategyPort).

pub mod cancel;
pub mod config;
pub mod loop_runner;
pub mod state;

pub use cancel::{CancelToken, RunLimits};
pub use config::{BacktestConfig, FeeSchedule, SlippageModel, DEFAULT_HISTORY_WINDOW};
pub use loop_runner::run_backtest;
pub use state::{EngineError, RunCounters, RunResult, RunStatus};
