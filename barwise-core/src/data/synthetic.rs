//! Seeded synthetic candle source for offline runs and tests.
//!
//! Each candle is derived from a BLAKE3 hash of `(seed, symbol, timestamp)`,
//! so any two fetches that overlap produce identical candles for the shared
//! timestamps, regardless of how the range was split.

use super::source::{CandleSource, SourceError};
use crate::domain::{Candle, CandleOrigin, Timeframe};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    base_price: f64,
    /// Per-bar noise as a fraction of price.
    noise: f64,
    /// Amplitude of the slow sine drift as a fraction of the base price.
    swing: f64,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            base_price: 100.0,
            noise: 0.002,
            swing: 0.05,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    fn rng_for(&self, symbol: &str, ts: DateTime<Utc>) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(&ts.timestamp().to_le_bytes());
        let hash = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(hash.as_bytes());
        StdRng::from_seed(seed)
    }

    /// Deterministic candle for one timestamp.
    pub fn candle_at(&self, symbol: &str, timeframe: Timeframe, ts: DateTime<Utc>) -> Candle {
        let mut rng = self.rng_for(symbol, ts);
        let step = timeframe.duration().num_seconds().max(1);
        let bar_number = ts.timestamp() / step;
        // One full swing every 390 bars (a US equity session of 1m bars).
        let phase = (bar_number % 390) as f64 / 390.0 * std::f64::consts::TAU;
        let mid = self.base_price * (1.0 + self.swing * phase.sin());

        let open = mid * (1.0 + rng.gen_range(-self.noise..=self.noise));
        let close = mid * (1.0 + rng.gen_range(-self.noise..=self.noise));
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..=self.noise));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..=self.noise));
        let volume = rng.gen_range(100.0..10_000.0_f64).round();

        Candle {
            symbol: symbol.to_string(),
            timeframe,
            timestamp_utc: ts,
            open,
            high,
            low,
            close,
            volume,
            source: CandleOrigin::LiveFetch,
            last_updated_utc: ts + timeframe.duration(),
        }
    }
}

/// First multiple of `step` at or after `ts`.
fn align_up(ts: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_s = step.num_seconds().max(1);
    let secs = ts.timestamp();
    let aligned = secs.div_euclid(step_s) * step_s;
    let past = aligned < secs || (aligned == secs && ts.timestamp_subsec_nanos() > 0);
    let aligned = if past { aligned + step_s } else { aligned };
    DateTime::from_timestamp(aligned, 0).unwrap_or(ts)
}

impl CandleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, SourceError> {
        if symbol.is_empty() {
            return Err(SourceError::BadRequest("empty symbol".into()));
        }
        let step = timeframe.duration();
        let mut candles = Vec::new();
        let mut ts = align_up(start, step);
        while ts < end {
            candles.push(self.candle_at(symbol, timeframe, ts));
            ts += step;
        }
        Ok(candles)
    }
}
