//! Error taxonomy shared across the core.
//!
//! | Error                 | Severity                                           |
//! |-----------------------|----------------------------------------------------|
//! | `DataIntegrityError`  | fatal: the run aborts, partial results are kept    |
//! | `TransientFetchError` | surfaced: caller proceeds on stale data or aborts  |
//! | `QuotaViolationError` | fatal in strict mode (caller defect)               |
//! | `StrategyFault`       | recovered: logged, treated as "no signal"          |

use crate::data::source::SourceError;
use crate::domain::Timeframe;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Malformed or out-of-order candle data.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("data integrity error for {symbol}/{timeframe} at {location}: {reason}")]
pub struct DataIntegrityError {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Where the defect sits: a file row, a batch index, or a timestamp.
    pub location: String,
    pub reason: String,
}

impl DataIntegrityError {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            location: location.into(),
            reason: reason.into(),
        }
    }
}

/// Retries exhausted on transient source failures.
#[derive(Debug, Clone, Error)]
#[error("fetch for {symbol}/{timeframe} failed after {attempts} attempts: {last}")]
pub struct TransientFetchError {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub attempts: u32,
    pub last: SourceError,
}

/// An entry was recorded after the day's quota was already used.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("quota violation for {symbol} on {date}: {quota} entries already recorded")]
pub struct QuotaViolationError {
    pub symbol: String,
    pub date: NaiveDate,
    pub quota: u32,
}

/// Error or panic raised by a strategy implementation.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("strategy fault for {symbol} at {timestamp}: {message}")]
pub struct StrategyFault {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl StrategyFault {
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            message: message.into(),
        }
    }
}
