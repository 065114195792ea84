//! Signal: an entry proposal produced by a strategy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry signal with its protective stop and profit target.
///
/// `valid == false` means "no trade on this step"; the price fields are then
/// meaningless. A valid signal still goes through [`Signal::check`] before
/// the engine acts on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub reason: String,
    pub valid: bool,
}

impl Signal {
    pub fn long(entry_price: f64, stop_loss: f64, take_profit: f64, reason: impl Into<String>) -> Self {
        Self {
            side: Side::Long,
            entry_price,
            stop_loss,
            take_profit,
            reason: reason.into(),
            valid: true,
        }
    }

    pub fn short(entry_price: f64, stop_loss: f64, take_profit: f64, reason: impl Into<String>) -> Self {
        Self {
            side: Side::Short,
            entry_price,
            stop_loss,
            take_profit,
            reason: reason.into(),
            valid: true,
        }
    }

    /// A "no trade" signal.
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            side: Side::Long,
            entry_price: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            reason: reason.into(),
            valid: false,
        }
    }

    /// Validate price geometry: long needs `stop < entry < target`, short the mirror.
    pub fn check(&self) -> Result<(), String> {
        if !self.valid {
            return Err("signal is flagged invalid".into());
        }
        for (name, value) in [
            ("entry_price", self.entry_price),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} must be a positive finite price, got {value}"));
            }
        }
        let ordered = match self.side {
            Side::Long => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Side::Short => self.take_profit < self.entry_price && self.entry_price < self.stop_loss,
        };
        if !ordered {
            return Err(format!(
                "{} signal has inconsistent levels: entry={} stop={} target={}",
                self.side, self.entry_price, self.stop_loss, self.take_profit
            ));
        }
        Ok(())
    }
}

/// Answer from `StrategyPort::should_close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitDecision {
    pub close: bool,
    pub reason: String,
}

impl ExitDecision {
    pub fn hold() -> Self {
        Self {
            close: false,
            reason: String::new(),
        }
    }

    pub fn close(reason: impl Into<String>) -> Self {
        Self {
            close: true,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_geometry() {
        assert!(Signal::long(100.0, 98.0, 106.0, "t").check().is_ok());
        assert!(Signal::long(100.0, 101.0, 106.0, "t").check().is_err());
        assert!(Signal::long(100.0, 98.0, 99.0, "t").check().is_err());
    }

    #[test]
    fn short_geometry() {
        assert!(Signal::short(100.0, 102.0, 94.0, "t").check().is_ok());
        assert!(Signal::short(100.0, 98.0, 94.0, "t").check().is_err());
    }

    #[test]
    fn none_is_never_actionable() {
        let s = Signal::none("flat market");
        assert!(!s.valid);
        assert!(s.check().is_err());
    }

    #[test]
    fn rejects_non_finite_levels() {
        assert!(Signal::long(f64::NAN, 98.0, 106.0, "t").check().is_err());
        assert!(Signal::long(100.0, 0.0, 106.0, "t").check().is_err());
    }
}
