//! Trading scheduler: entry windows, forced-close windows and the daily quota.
//!
//! All decisions are taken on local wall-clock time, derived from the UTC
//! instant with the configured IANA zone at the point of use. DST shifts
//! are therefore handled by `chrono-tz`, never by fixed offsets.
//!
//! The scheduler is owned by a single run; nothing here is shared.

mod window;

pub use window::TimeWindow;

use crate::error::QuotaViolationError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why an entry is not allowed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    OutsideEntryWindow,
    InForceCloseWindow,
    QuotaExhausted,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DenyReason::OutsideEntryWindow => "outside entry window",
            DenyReason::InForceCloseWindow => "inside forced-close window",
            DenyReason::QuotaExhausted => "daily quota exhausted",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPermission {
    Allowed,
    Denied(DenyReason),
}

impl EntryPermission {
    pub fn is_allowed(self) -> bool {
        matches!(self, EntryPermission::Allowed)
    }
}

#[derive(Debug, Clone)]
pub struct TradingScheduler {
    timezone: Tz,
    entry_window: TimeWindow,
    force_close_window: TimeWindow,
    daily_quota: u32,
    strict: bool,
    /// Per symbol: the local date of its latest entry and that day's count.
    /// Replaced when the date advances, so one entry per symbol at most.
    days: BTreeMap<String, (NaiveDate, u32)>,
}

impl TradingScheduler {
    pub fn new(
        timezone: Tz,
        entry_window: TimeWindow,
        force_close_window: TimeWindow,
        daily_quota: u32,
        strict: bool,
    ) -> Self {
        Self {
            timezone,
            entry_window,
            force_close_window,
            daily_quota,
            strict,
            days: BTreeMap::new(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn local(&self, ts_utc: DateTime<Utc>) -> (NaiveDate, NaiveTime) {
        let local = ts_utc.with_timezone(&self.timezone);
        (local.date_naive(), local.time())
    }

    pub fn can_enter(&self, symbol: &str, ts_utc: DateTime<Utc>) -> EntryPermission {
        let (date, time) = self.local(ts_utc);
        if self.force_close_window.contains(time) {
            return EntryPermission::Denied(DenyReason::InForceCloseWindow);
        }
        if !self.entry_window.contains(time) {
            return EntryPermission::Denied(DenyReason::OutsideEntryWindow);
        }
        if self.entries_on(symbol, date) >= self.daily_quota {
            return EntryPermission::Denied(DenyReason::QuotaExhausted);
        }
        EntryPermission::Allowed
    }

    pub fn must_force_close(&self, _symbol: &str, ts_utc: DateTime<Utc>) -> bool {
        let (_, time) = self.local(ts_utc);
        self.force_close_window.contains(time)
    }

    /// Count one entry for `symbol` on the local date of `ts_utc`.
    ///
    /// Returns the day's count after recording. Past the quota, strict mode
    /// fails; lenient mode logs and leaves the count untouched.
    pub fn record_entry(
        &mut self,
        symbol: &str,
        ts_utc: DateTime<Utc>,
    ) -> Result<u32, QuotaViolationError> {
        let (date, _) = self.local(ts_utc);
        let day = self.days.entry(symbol.to_string()).or_insert((date, 0));
        if day.0 != date {
            log::debug!("{symbol}: new trading day {date}, quota reset");
            *day = (date, 0);
        }

        let count = &mut day.1;
        if *count >= self.daily_quota {
            if self.strict {
                return Err(QuotaViolationError {
                    symbol: symbol.to_string(),
                    date,
                    quota: self.daily_quota,
                });
            }
            log::warn!(
                "{symbol}: entry at {ts_utc} exceeds daily quota {} on {date}; not counted",
                self.daily_quota
            );
            return Ok(*count);
        }
        *count += 1;
        Ok(*count)
    }

    /// Entries counted for `symbol` on `date`. Only the symbol's latest
    /// entry day is kept; earlier days read as zero.
    pub fn entries_on(&self, symbol: &str, date: NaiveDate) -> u32 {
        match self.days.get(symbol) {
            Some(&(day, count)) if day == date => count,
            _ => 0,
        }
    }
}
