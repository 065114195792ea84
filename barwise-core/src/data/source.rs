//! Candle source trait and its error classification.
//!
//! A `CandleSource` abstracts over where historical candles come from (an HTTP
//! endpoint, a synthetic generator, a test double). The gateway sits above
//! this trait and owns retry policy; sources only report what went wrong.

use crate::domain::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure reported by a candle source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by source (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Timeouts, rate limits and temporary outages may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Timeout(_) | SourceError::RateLimited { .. } | SourceError::Unavailable(_)
        )
    }
}

/// Trait for remote (or generated) candle providers.
pub trait CandleSource: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Fetch candles with `start <= timestamp_utc < end`, ascending.
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, SourceError>;
}
