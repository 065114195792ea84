//! Position: an open exposure held by the position simulator.

use super::signal::Side;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// An open position. At most one exists per symbol at any instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    /// Fill price after slippage.
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub entry_time_utc: DateTime<Utc>,
}

impl Position {
    pub fn entry_time_local(&self, tz: Tz) -> DateTime<Tz> {
        self.entry_time_utc.with_timezone(&tz)
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.size
    }

    /// Gross price PnL if closed at `exit_price`.
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.size * self.side.sign()
    }

    /// True if a bar with this range touches the stop.
    pub fn stop_touched(&self, low: f64, high: f64) -> bool {
        match self.side {
            Side::Long => low <= self.stop_loss,
            Side::Short => high >= self.stop_loss,
        }
    }

    /// True if a bar with this range touches the target.
    pub fn target_touched(&self, low: f64, high: f64) -> bool {
        match self.side {
            Side::Long => high >= self.take_profit,
            Side::Short => low <= self.take_profit,
        }
    }

    /// True if `price` is already at or beyond the target.
    pub fn beyond_target(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price >= self.take_profit,
            Side::Short => price <= self.take_profit,
        }
    }
}
