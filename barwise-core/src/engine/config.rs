//! Immutable run input.

use crate::broker::{CostModel, PositionSimulator, TieBreak};
use crate::domain::Timeframe;
use crate::scheduler::{TimeWindow, TradingScheduler};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_HISTORY_WINDOW: usize = 200;

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

fn default_strict() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fraction of notional charged per leg.
    pub fee_fraction: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlippageModel {
    /// Adverse price move applied to every fill, as a fraction of price.
    pub fraction: f64,
}

/// Everything a run depends on besides candles and the strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    /// Inclusive.
    pub start_utc: DateTime<Utc>,
    /// Exclusive.
    pub end_utc: DateTime<Utc>,
    /// IANA zone for every local-time rule.
    pub timezone: Tz,
    pub entry_window: TimeWindow,
    pub force_close_window: TimeWindow,
    pub risk_fraction: f64,
    pub max_leverage: f64,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub slippage: SlippageModel,
    pub daily_quota: u32,
    #[serde(default = "default_strict")]
    pub strict: bool,
    pub initial_capital: f64,
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Maximum candles handed to the strategy per call.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.symbols.is_empty() {
            return Err("symbols must not be empty".into());
        }
        let mut seen = BTreeSet::new();
        for s in &self.symbols {
            if s.trim().is_empty() {
                return Err("symbol names must not be blank".into());
            }
            if !seen.insert(s.as_str()) {
                return Err(format!("duplicate symbol '{s}'"));
            }
        }
        if self.start_utc >= self.end_utc {
            return Err(format!(
                "start_utc ({}) must be before end_utc ({})",
                self.start_utc, self.end_utc
            ));
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(format!("initial_capital must be positive, got {}", self.initial_capital));
        }
        if !(self.risk_fraction > 0.0 && self.risk_fraction <= 1.0) {
            return Err(format!("risk_fraction must be in (0, 1], got {}", self.risk_fraction));
        }
        if !(self.max_leverage.is_finite() && self.max_leverage > 0.0) {
            return Err(format!("max_leverage must be positive, got {}", self.max_leverage));
        }
        if !(self.fees.fee_fraction.is_finite() && self.fees.fee_fraction >= 0.0) {
            return Err(format!("fee_fraction must be >= 0, got {}", self.fees.fee_fraction));
        }
        if !(self.slippage.fraction.is_finite() && self.slippage.fraction >= 0.0) {
            return Err(format!("slippage fraction must be >= 0, got {}", self.slippage.fraction));
        }
        if self.daily_quota == 0 {
            return Err("daily_quota must be at least 1".into());
        }
        if self.history_window == 0 {
            return Err("history_window must be at least 1".into());
        }
        Ok(())
    }

    /// Symbols in the deterministic processing order (by name).
    pub fn sorted_symbols(&self) -> Vec<String> {
        let mut symbols = self.symbols.clone();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.slippage.fraction, self.fees.fee_fraction)
    }

    pub fn scheduler(&self) -> TradingScheduler {
        TradingScheduler::new(
            self.timezone,
            self.entry_window,
            self.force_close_window,
            self.daily_quota,
            self.strict,
        )
    }

    pub fn simulator(&self) -> PositionSimulator {
        PositionSimulator::new(
            self.initial_capital,
            self.risk_fraction,
            self.max_leverage,
            self.cost_model(),
            self.tie_break,
        )
    }

    /// BLAKE3 of the canonical JSON form.
    pub fn digest(&self) -> blake3::Hash {
        // Serializing plain data into a String cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_config() -> BacktestConfig {
        BacktestConfig {
            symbols: vec!["MSFT".into(), "AAPL".into()],
            timeframe: Timeframe::M5,
            start_utc: Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap(),
            end_utc: Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap(),
            timezone: chrono_tz::America::New_York,
            entry_window: TimeWindow::parse("09:30", "15:30").unwrap(),
            force_close_window: TimeWindow::parse("15:50", "16:00").unwrap(),
            risk_fraction: 0.01,
            max_leverage: 1.0,
            fees: FeeSchedule::default(),
            slippage: SlippageModel::default(),
            daily_quota: 2,
            strict: true,
            initial_capital: 10_000.0,
            tie_break: TieBreak::StopFirst,
            history_window: 200,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(make_config().validate().is_ok());
        assert_eq!(make_config().sorted_symbols(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn rejects_bad_fields() {
        let cases: Vec<Box<dyn Fn(&mut BacktestConfig)>> = vec![
            Box::new(|c| c.symbols.clear()),
            Box::new(|c| c.symbols.push("AAPL".into())),
            Box::new(|c| c.end_utc = c.start_utc),
            Box::new(|c| c.initial_capital = 0.0),
            Box::new(|c| c.risk_fraction = 1.5),
            Box::new(|c| c.risk_fraction = 0.0),
            Box::new(|c| c.max_leverage = 0.0),
            Box::new(|c| c.fees.fee_fraction = -0.1),
            Box::new(|c| c.slippage.fraction = f64::NAN),
            Box::new(|c| c.daily_quota = 0),
            Box::new(|c| c.history_window = 0),
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut cfg = make_config();
            mutate(&mut cfg);
            assert!(cfg.validate().is_err(), "case {i} should be rejected");
        }
    }

    #[test]
    fn digest_changes_with_config() {
        let a = make_config();
        let mut b = make_config();
        b.daily_quota = 3;
        assert_eq!(a.digest(), make_config().digest());
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn json_defaults_fill_optional_fields() {
        let json = r#"{
            "symbols": ["AAPL"],
            "timeframe": "1m",
            "start_utc": "2024-03-04T00:00:00Z",
            "end_utc": "2024-03-05T00:00:00Z",
            "timezone": "America/New_York",
            "entry_window": {"start": "09:30", "end": "15:30"},
            "force_close_window": {"start": "15:50", "end": "16:00"},
            "risk_fraction": 0.01,
            "max_leverage": 2.0,
            "daily_quota": 1,
            "initial_capital": 5000.0
        }"#;
        let cfg: BacktestConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.strict);
        assert_eq!(cfg.history_window, DEFAULT_HISTORY_WINDOW);
        assert_eq!(cfg.tie_break, TieBreak::StopFirst);
        assert_eq!(cfg.fees.fee_fraction, 0.0);
        assert!(cfg.validate().is_ok());
    }
}
