//! Barwise Runner: run orchestration, metrics and artifacts.
//!
//! This crate builds on `barwise-core` to provide:
//! - TOML run configuration with validation
//! - Data preparation: optional gateway sync, stale-data policy, store reads
//! - Single and parallel (rayon) backtest runs
//! - Performance metrics
//! - Run artifacts (trade ledger, equity curve, JSON summary)
//! - A reference channel-breakout strategy

pub mod config;
pub mod metrics;
pub mod reporting;
pub mod runner;
pub mod strategies;

pub use config::{ConfigError, DataConfig, RunConfig, StalePolicy, StrategyConfig};
pub use metrics::PerformanceMetrics;
pub use reporting::{ArtifactManager, ArtifactPaths, RunSummary};
pub use runner::{run_prepared, PreparedData, RunError, RunOutcome, Runner};
pub use strategies::ChannelBreakout;
