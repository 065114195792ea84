//! Run status, engine errors, and the run result.

use crate::domain::{EquityCurve, Position, Trade};
use crate::error::{DataIntegrityError, QuotaViolationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal condition that stops a run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),

    #[error(transparent)]
    QuotaViolation(#[from] QuotaViolationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    TimedOut,
    Failed(EngineError),
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::TimedOut => "timed_out",
            RunStatus::Failed(_) => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }

    pub fn error(&self) -> Option<&EngineError> {
        match self {
            RunStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-run tallies, useful for diagnosing why a strategy did not trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub candles_processed: usize,
    /// Valid signals returned by the strategy.
    pub signals: usize,
    /// Positions actually opened.
    pub entries: usize,
    /// Signals refused by the simulator.
    pub rejections: usize,
    /// Entry checks refused by the scheduler.
    pub entries_denied: usize,
    pub strategy_faults: usize,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    /// BLAKE3 of the config and the input candles, hex.
    pub run_id: String,
    pub status: RunStatus,
    /// Closed trades in close order.
    pub trades: Vec<Trade>,
    pub equity_curve: EquityCurve,
    pub initial_capital: f64,
    pub final_equity: f64,
    /// Positions still open when the run stopped early. Empty on completion.
    pub open_positions: Vec<Position>,
    pub counters: RunCounters,
}

impl RunResult {
    /// `initial + Σpnl − Σfees` in ledger order; equals `final_equity` exactly.
    pub fn ledger_equity(&self) -> f64 {
        let pnl: f64 = self.trades.iter().map(|t| t.pnl).sum();
        let fees: f64 = self.trades.iter().map(|t| t.fees).sum();
        self.initial_capital + pnl - fees
    }
}
