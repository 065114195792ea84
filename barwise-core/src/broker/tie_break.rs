//! Resolution of bars whose range touches both the stop and the target.
//!
//! A single OHLC bar does not say which level traded first, so the choice is
//! a policy. `StopFirst` is the conservative default.

use crate::domain::{Candle, ExitReason, Position, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Stop fills first, unless the bar opened already beyond the target,
    /// in which case the target fills at the open.
    #[default]
    StopFirst,
    /// Target fills first.
    TargetFirst,
    /// Infer the intrabar path from OHLC: if the open is nearer the high,
    /// assume Open → High → Low → Close, else Open → Low → High → Close.
    OhlcPath,
}

impl TieBreak {
    /// Exit reason and raw (pre-slippage) price for an ambiguous bar.
    pub fn resolve(self, position: &Position, candle: &Candle) -> (ExitReason, f64) {
        let stop = (ExitReason::StopLoss, position.stop_loss);
        let target = (ExitReason::TakeProfit, position.take_profit);
        match self {
            TieBreak::StopFirst => {
                if position.beyond_target(candle.open) {
                    (ExitReason::TakeProfit, candle.open)
                } else {
                    stop
                }
            }
            TieBreak::TargetFirst => target,
            TieBreak::OhlcPath => {
                let high_first = (candle.open - candle.high).abs() <= (candle.open - candle.low).abs();
                match (position.side, high_first) {
                    (Side::Long, true) | (Side::Short, false) => target,
                    (Side::Long, false) | (Side::Short, true) => stop,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandleOrigin, Timeframe};
    use chrono::{TimeZone, Utc};

    fn make_position(side: Side) -> Position {
        let (stop, target) = match side {
            Side::Long => (98.0, 106.0),
            Side::Short => (102.0, 94.0),
        };
        Position {
            symbol: "AAPL".into(),
            side,
            entry_price: 100.0,
            stop_loss: stop,
            take_profit: target,
            size: 10.0,
            entry_time_utc: Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
        }
    }

    fn make_candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 15, 5, 0).unwrap();
        Candle {
            symbol: "AAPL".into(),
            timeframe: Timeframe::M5,
            timestamp_utc: ts,
            open,
            high,
            low,
            close,
            volume: 1_000.0,
            source: CandleOrigin::LiveFetch,
            last_updated_utc: ts,
        }
    }

    #[test]
    fn stop_first_prefers_stop() {
        let pos = make_position(Side::Long);
        let bar = make_candle(100.0, 107.0, 97.0, 101.0);
        assert_eq!(TieBreak::StopFirst.resolve(&pos, &bar), (ExitReason::StopLoss, 98.0));
    }

    #[test]
    fn stop_first_fills_target_at_open_when_gapped_through() {
        let pos = make_position(Side::Long);
        let bar = make_candle(107.0, 108.0, 97.0, 99.0);
        assert_eq!(TieBreak::StopFirst.resolve(&pos, &bar), (ExitReason::TakeProfit, 107.0));
    }

    #[test]
    fn target_first_prefers_target() {
        let pos = make_position(Side::Short);
        let bar = make_candle(100.0, 103.0, 93.0, 100.0);
        assert_eq!(TieBreak::TargetFirst.resolve(&pos, &bar), (ExitReason::TakeProfit, 94.0));
    }

    #[test]
    fn ohlc_path_follows_nearer_extreme() {
        let long = make_position(Side::Long);
        let short = make_position(Side::Short);
        // Open near the high: the high traded first.
        let up_first = make_candle(105.0, 107.0, 97.0, 100.0);
        assert_eq!(TieBreak::OhlcPath.resolve(&long, &up_first).0, ExitReason::TakeProfit);
        assert_eq!(TieBreak::OhlcPath.resolve(&short, &up_first).0, ExitReason::StopLoss);
        // Open near the low: the low traded first.
        let down_first = make_candle(98.5, 107.0, 93.0, 100.0);
        assert_eq!(TieBreak::OhlcPath.resolve(&long, &down_first).0, ExitReason::StopLoss);
        assert_eq!(TieBreak::OhlcPath.resolve(&short, &down_first).0, ExitReason::TakeProfit);
    }
}
