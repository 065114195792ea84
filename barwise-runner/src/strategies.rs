//! Reference strategies.
//!
//! Indicator research lives outside this workspace; the channel breakout
//! here exists so the CLI and tests have a realistic strategy to drive.

use barwise_core::domain::{Candle, ExitDecision, Position, Side, Signal};
use barwise_core::strategy::{HistoryWindow, StrategyPort};
use barwise_core::StrategyFault;

/// Close beyond the high/low of the previous `lookback` candles.
///
/// The stop sits at the opposite side of the channel, the target at
/// `reward_risk` times the stop distance. Open positions are exited when a
/// candle closes back through the channel midline.
#[derive(Debug, Clone)]
pub struct ChannelBreakout {
    lookback: usize,
    reward_risk: f64,
    allow_short: bool,
}

impl ChannelBreakout {
    pub fn new(lookback: usize, reward_risk: f64, allow_short: bool) -> Self {
        Self {
            lookback: lookback.max(1),
            reward_risk,
            allow_short,
        }
    }

    /// `(high, low)` of the `lookback` candles before the current one.
    fn channel(&self, window: &HistoryWindow<'_>) -> Option<(f64, f64)> {
        let previous = window.previous();
        if previous.len() < self.lookback {
            return None;
        }
        let recent = &previous[previous.len() - self.lookback..];
        let high = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        Some((high, low))
    }
}

impl StrategyPort for ChannelBreakout {
    fn name(&self) -> &str {
        "channel_breakout"
    }

    fn fingerprint(&self) -> String {
        format!(
            "channel_breakout(lookback={}, reward_risk={}, allow_short={})",
            self.lookback, self.reward_risk, self.allow_short
        )
    }

    fn generate_signal(&mut self, window: &HistoryWindow<'_>) -> Result<Signal, StrategyFault> {
        let Some((high, low)) = self.channel(window) else {
            return Ok(Signal::none("warming up"));
        };
        let current: &Candle = window.current();
        let close = current.close;

        if close > high {
            let risk = close - low;
            return Ok(Signal::long(
                close,
                low,
                close + self.reward_risk * risk,
                format!("close {close:.4} above {}-bar high {high:.4}", self.lookback),
            ));
        }
        if self.allow_short && close < low {
            let risk = high - close;
            let target = close - self.reward_risk * risk;
            if target <= 0.0 {
                return Ok(Signal::none("target below zero"));
            }
            return Ok(Signal::short(
                close,
                high,
                target,
                format!("close {close:.4} below {}-bar low {low:.4}", self.lookback),
            ));
        }
        Ok(Signal::none("inside channel"))
    }

    fn should_close(
        &mut self,
        position: &Position,
        window: &HistoryWindow<'_>,
    ) -> Result<ExitDecision, StrategyFault> {
        let Some((high, low)) = self.channel(window) else {
            return Ok(ExitDecision::hold());
        };
        let mid = (high + low) / 2.0;
        let close = window.current().close;
        let failed = match position.side {
            Side::Long => close < mid,
            Side::Short => close > mid,
        };
        Ok(if failed {
            ExitDecision::close(format!("close {close:.4} back through midline {mid:.4}"))
        } else {
            ExitDecision::hold()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barwise_core::domain::{CandleOrigin, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "AAPL".into(),
                timeframe: Timeframe::M5,
                timestamp_utc: base + Duration::minutes(5 * i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 100.0,
                source: CandleOrigin::LiveFetch,
                last_updated_utc: base,
            })
            .collect()
    }

    fn signal_for(strategy: &mut ChannelBreakout, candles: &[Candle]) -> Signal {
        let window = HistoryWindow::new("AAPL", chrono_tz::UTC, candles).unwrap();
        strategy.generate_signal(&window).unwrap()
    }

    #[test]
    fn warms_up_before_lookback() {
        let mut s = ChannelBreakout::new(3, 2.0, false);
        assert!(!signal_for(&mut s, &make_candles(&[100.0, 100.0, 105.0])).valid);
    }

    #[test]
    fn long_breakout_has_channel_stop_and_scaled_target() {
        let mut s = ChannelBreakout::new(3, 2.0, false);
        let signal = signal_for(&mut s, &make_candles(&[100.0, 100.0, 100.0, 102.0]));
        assert!(signal.valid);
        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.stop_loss, 99.5);
        assert!((signal.take_profit - (102.0 + 2.0 * 2.5)).abs() < 1e-9);
        assert!(signal.check().is_ok());
    }

    #[test]
    fn shorts_only_when_allowed() {
        let candles = make_candles(&[100.0, 100.0, 100.0, 98.0]);
        assert!(!signal_for(&mut ChannelBreakout::new(3, 2.0, false), &candles).valid);
        let signal = signal_for(&mut ChannelBreakout::new(3, 2.0, true), &candles);
        assert_eq!(signal.side, Side::Short);
        assert_eq!(signal.stop_loss, 100.5);
        assert!(signal.check().is_ok());
    }

    #[test]
    fn fingerprint_tracks_parameters() {
        assert_ne!(
            ChannelBreakout::new(3, 2.0, false).fingerprint(),
            ChannelBreakout::new(4, 2.0, false).fingerprint()
        );
    }

    #[test]
    fn exits_on_midline_failure() {
        let mut s = ChannelBreakout::new(3, 2.0, false);
        let candles = make_candles(&[100.0, 102.0, 104.0, 101.0]);
        let window = HistoryWindow::new("AAPL", chrono_tz::UTC, &candles).unwrap();
        let position = Position {
            symbol: "AAPL".into(),
            side: Side::Long,
            entry_price: 104.0,
            stop_loss: 99.5,
            take_profit: 113.0,
            size: 1.0,
            entry_time_utc: candles[2].timestamp_utc,
        };
        // Channel 99.5..104.5, midline 102.0; close 101 is below it.
        assert!(s.should_close(&position, &window).unwrap().close);
    }
}
