//! Run summary export (JSON).

use barwise_core::data::SyncReport;
use barwise_core::domain::Position;
use barwise_core::engine::RunCounters;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::metrics::PerformanceMetrics;
use crate::runner::RunOutcome;

/// Everything needed to judge and reproduce a run, minus the ledgers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    /// `completed`, `cancelled`, `timed_out` or `failed`.
    pub status: String,
    /// Why the run failed, when it did.
    pub error: Option<String>,
    pub strategy: String,
    pub metrics: PerformanceMetrics,
    pub counters: RunCounters,
    pub open_positions: Vec<Position>,
    pub dataset_hash: String,
    pub stale_symbols: Vec<String>,
    pub sync: Vec<SyncReport>,
    pub config: RunConfig,
}

impl RunSummary {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        let result = &outcome.result;
        Self {
            run_id: result.run_id.clone(),
            status: result.status.as_str().to_string(),
            error: result.status.error().map(|e| e.to_string()),
            strategy: outcome.config.strategy.name().to_string(),
            metrics: outcome.metrics.clone(),
            counters: result.counters,
            open_positions: result.open_positions.clone(),
            dataset_hash: outcome.dataset_hash.clone(),
            stale_symbols: outcome.stale_symbols.clone(),
            sync: outcome.sync_reports.clone(),
            config: outcome.config.clone(),
        }
    }
}
