//! Market data gateway: paged, retried fetches on top of a [`CandleSource`].
//!
//! Features:
//! - Incremental fetch of everything after the last stored timestamp
//! - Bounded range re-fetch for gap reconciliation
//! - Requests split into pages of at most `max_candles_per_request` bars
//! - Every page under the [`RetryPolicy`]; transient exhaustion and
//!   non-retryable rejections are reported as distinct errors
//! - `sync` ties the gateway to a [`CandleStore`]: fetch, write, find gaps,
//!   back-fill, report

use super::gaps::GapRange;
use super::retry::{Clock, RetryError, RetryPolicy};
use super::source::{CandleSource, SourceError};
use super::store::{CandleStore, StoreError};
use crate::domain::{Candle, CandleOrigin, Timeframe};
use crate::error::TransientFetchError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_MAX_CANDLES_PER_REQUEST: u32 = 1_000;
pub const DEFAULT_MAX_GAP_REFETCHES: usize = 16;

/// A fetch that did not produce candles.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transient(#[from] TransientFetchError),

    #[error("source rejected request for {symbol}/{timeframe}: {error}")]
    Rejected {
        symbol: String,
        timeframe: Timeframe,
        #[source]
        error: SourceError,
    },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a `sync` call did for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Candles returned by the incremental fetch.
    pub fetched: usize,
    pub inserted: usize,
    pub replaced: usize,
    /// Candles returned by gap re-fetches.
    pub backfilled: usize,
    pub gaps_found: usize,
    /// Gaps still present after reconciliation (closed markets, refetch cap, source holes).
    pub unresolved_gaps: Vec<GapRange>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

pub struct MarketDataGateway {
    source: Arc<dyn CandleSource>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    max_candles_per_request: u32,
    max_gap_refetches: usize,
}

impl MarketDataGateway {
    pub fn new(source: Arc<dyn CandleSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            retry: RetryPolicy::default(),
            max_candles_per_request: DEFAULT_MAX_CANDLES_PER_REQUEST,
            max_gap_refetches: DEFAULT_MAX_GAP_REFETCHES,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Clamped to `1..=i32::MAX` so a page span always moves forward.
    pub fn with_max_candles_per_request(mut self, max: u32) -> Self {
        self.max_candles_per_request = max.clamp(1, i32::MAX as u32);
        self
    }

    pub fn with_max_gap_refetches(mut self, max: usize) -> Self {
        self.max_gap_refetches = max;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Candles with `since_utc < timestamp_utc <= now`, ascending, tagged `LiveFetch`.
    pub fn fetch_incremental(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_utc: DateTime<Utc>,
    ) -> Result<Vec<Candle>, FetchError> {
        let end = self.clock.now() + Duration::milliseconds(1);
        let start = since_utc + Duration::milliseconds(1);
        let mut candles = self.fetch_paged(symbol, timeframe, start, end)?;
        candles.retain(|c| c.timestamp_utc > since_utc);
        for c in &mut candles {
            c.source = CandleOrigin::LiveFetch;
        }
        Ok(candles)
    }

    /// Re-fetch exactly the bars of `gap`, tagged `Backfill`.
    pub fn fetch_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        gap: &GapRange,
    ) -> Result<Vec<Candle>, FetchError> {
        let end = gap.end_exclusive(timeframe.duration());
        let mut candles = self.fetch_paged(symbol, timeframe, gap.start, end)?;
        candles.retain(|c| gap.contains(c.timestamp_utc));
        for c in &mut candles {
            c.source = CandleOrigin::Backfill;
        }
        Ok(candles)
    }

    /// Bring the stored series for one key up to date.
    ///
    /// Fetches from the last stored timestamp (or from `default_since`,
    /// inclusive, for an empty key), writes, then re-fetches up to
    /// `max_gap_refetches` detected gaps. A transient failure while
    /// back-filling leaves the gap unresolved rather than failing the sync.
    pub fn sync(
        &self,
        store: &CandleStore,
        symbol: &str,
        timeframe: Timeframe,
        default_since: DateTime<Utc>,
    ) -> Result<SyncReport, GatewayError> {
        let interval = timeframe.duration();
        let (_, last) = store.read(symbol, timeframe)?;

        let fetched = match last {
            Some(last) => self.fetch_incremental(symbol, timeframe, last)?,
            None => self.fetch_incremental(
                symbol,
                timeframe,
                default_since - Duration::milliseconds(1),
            )?,
        };
        let summary = store.write(symbol, timeframe, &fetched)?;

        let gaps = store.detect_gaps(symbol, timeframe, interval)?;
        let mut backfilled = 0;
        let mut replaced = summary.replaced;
        let mut inserted = summary.inserted;
        for gap in gaps.iter().take(self.max_gap_refetches) {
            let fill = match self.fetch_range(symbol, timeframe, gap) {
                Ok(fill) => fill,
                Err(FetchError::Transient(e)) => {
                    log::warn!("back-fill of {symbol}/{timeframe} gap {gap} gave up: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if fill.is_empty() {
                continue;
            }
            backfilled += fill.len();
            let s = store.write(symbol, timeframe, &fill)?;
            inserted += s.inserted;
            replaced += s.replaced;
        }

        let unresolved_gaps = if backfilled > 0 {
            store.detect_gaps(symbol, timeframe, interval)?
        } else {
            gaps.clone()
        };
        let (_, last_timestamp) = store.read(symbol, timeframe)?;

        log::info!(
            "synced {symbol}/{timeframe} from {}: {} fetched, {backfilled} back-filled, {} gaps ({} unresolved)",
            self.source.name(),
            fetched.len(),
            gaps.len(),
            unresolved_gaps.len()
        );

        Ok(SyncReport {
            symbol: symbol.to_string(),
            timeframe,
            fetched: fetched.len(),
            inserted,
            replaced,
            backfilled,
            gaps_found: gaps.len(),
            unresolved_gaps,
            last_timestamp,
        })
    }

    /// Fetch `[start, end)` in pages, each page retried independently.
    fn fetch_paged(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, FetchError> {
        let per_request = i32::try_from(self.max_candles_per_request).unwrap_or(i32::MAX);
        let page_span = timeframe.duration() * per_request;
        let mut by_ts: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
        let mut cursor = start;
        while cursor < end {
            let page_end = cursor
                .checked_add_signed(page_span)
                .map_or(end, |page_end| page_end.min(end));
            let page = self
                .retry
                .run(self.clock.as_ref(), |_| {
                    self.source.fetch(symbol, timeframe, cursor, page_end)
                })
                .map_err(|e| match e {
                    RetryError::Exhausted { attempts, last } => {
                        FetchError::Transient(TransientFetchError {
                            symbol: symbol.to_string(),
                            timeframe,
                            attempts,
                            last,
                        })
                    }
                    RetryError::NonRetryable { error, .. } => FetchError::Rejected {
                        symbol: symbol.to_string(),
                        timeframe,
                        error,
                    },
                })?;
            log::debug!(
                "{}: {symbol}/{timeframe} page [{cursor}, {page_end}) -> {} candles",
                self.source.name(),
                page.len()
            );
            for candle in page {
                if start <= candle.timestamp_utc && candle.timestamp_utc < end {
                    by_ts.insert(candle.timestamp_utc, candle);
                }
            }
            cursor = page_end;
        }
        Ok(by_ts.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::retry::ManualClock;
    use crate::data::synthetic::SyntheticSource;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    /// Records every request and delegates to a synthetic source.
    struct Recording {
        inner: SyntheticSource,
        calls: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl CandleSource for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn fetch(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Candle>, SourceError> {
            self.calls.lock().unwrap().push((start, end));
            self.inner.fetch(symbol, timeframe, start, end)
        }
    }

    #[test]
    fn incremental_fetch_pages_and_excludes_since() {
        let source = Arc::new(Recording {
            inner: SyntheticSource::new(1),
            calls: Mutex::new(Vec::new()),
        });
        let clock = Arc::new(ManualClock::new(t(15, 0)));
        let gateway = MarketDataGateway::new(source.clone(), clock).with_max_candles_per_request(10);

        let candles = gateway.fetch_incremental("AAPL", Timeframe::M1, t(14, 30)).unwrap();
        assert_eq!(candles.first().unwrap().timestamp_utc, t(14, 31));
        assert_eq!(candles.last().unwrap().timestamp_utc, t(15, 0));
        assert_eq!(candles.len(), 30);
        assert_eq!(source.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn huge_page_size_fetches_in_one_forward_request() {
        let source = Arc::new(Recording {
            inner: SyntheticSource::new(1),
            calls: Mutex::new(Vec::new()),
        });
        let clock = Arc::new(ManualClock::new(t(15, 0)));
        let gateway =
            MarketDataGateway::new(source.clone(), clock).with_max_candles_per_request(u32::MAX);
        assert_eq!(gateway.max_candles_per_request, i32::MAX as u32);

        let candles = gateway.fetch_incremental("AAPL", Timeframe::D1, t(14, 30)).unwrap();
        assert!(candles.is_empty());
        let candles = gateway.fetch_incremental("AAPL", Timeframe::M1, t(14, 30)).unwrap();
        assert_eq!(candles.len(), 30);

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(start, end)| start < end));
    }

    #[test]
    fn range_fetch_is_bounded_and_tagged() {
        let clock = Arc::new(ManualClock::new(t(16, 0)));
        let gateway = MarketDataGateway::new(Arc::new(SyntheticSource::new(1)), clock);
        let gap = GapRange {
            start: t(14, 33),
            end: t(14, 35),
        };
        let candles = gateway.fetch_range("AAPL", Timeframe::M1, &gap).unwrap();
        let stamps: Vec<_> = candles.iter().map(|c| c.timestamp_utc).collect();
        assert_eq!(stamps, vec![t(14, 33), t(14, 34), t(14, 35)]);
        assert!(candles.iter().all(|c| c.source == CandleOrigin::Backfill));
    }
}
