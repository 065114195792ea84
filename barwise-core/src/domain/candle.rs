//! Candle: the fundamental market data unit.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Length of one bar.
    pub fn duration(self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| format!("unknown timeframe '{s}' (expected one of 1m, 5m, 15m, 30m, 1h, 4h, 1d)"))
    }
}

/// How a candle entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleOrigin {
    LiveFetch,
    Backfill,
    Correction,
}

impl CandleOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            CandleOrigin::LiveFetch => "live_fetch",
            CandleOrigin::Backfill => "backfill",
            CandleOrigin::Correction => "correction",
        }
    }
}

impl FromStr for CandleOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live_fetch" => Ok(CandleOrigin::LiveFetch),
            "backfill" => Ok(CandleOrigin::Backfill),
            "correction" => Ok(CandleOrigin::Correction),
            other => Err(format!("unknown candle source '{other}'")),
        }
    }
}

/// OHLCV candle for one symbol and one interval.
///
/// `timestamp_utc` is the canonical instant (bar open). The local timestamp is
/// never stored; call [`Candle::timestamp_local`] with the run's timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp_utc: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub source: CandleOrigin,
    pub last_updated_utc: DateTime<Utc>,
}

impl Candle {
    pub fn timestamp_local(&self, tz: Tz) -> DateTime<Tz> {
        self.timestamp_utc.with_timezone(&tz)
    }

    /// OHLCV sanity check. Returns the first violated rule.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() {
                return Err(format!("{name} is not a finite number"));
            }
            if value <= 0.0 {
                return Err(format!("{name} must be positive, got {value}"));
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(format!("volume must be non-negative, got {}", self.volume));
        }
        if self.high < self.low {
            return Err(format!("high {} below low {}", self.high, self.low));
        }
        if self.high < self.open.max(self.close) {
            return Err(format!("high {} below open/close", self.high));
        }
        if self.low > self.open.min(self.close) {
            return Err(format!("low {} above open/close", self.low));
        }
        Ok(())
    }
}
