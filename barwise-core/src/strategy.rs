//! Strategy port: the only seam between the engine and trading logic.
//!
//! A strategy sees a [`HistoryWindow`] (candles up to and including the
//! current one, never later ones) and answers two questions: should we
//! enter, and should an open position be closed early. Indicator logic
//! lives entirely behind this trait.

use crate::domain::{Candle, ExitDecision, Position, Signal};
use crate::error::StrategyFault;
use chrono::{DateTime, NaiveTime};
use chrono_tz::Tz;

/// Read-only view of one symbol's recent candles.
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow<'a> {
    symbol: &'a str,
    timezone: Tz,
    candles: &'a [Candle],
    current: &'a Candle,
}

impl<'a> HistoryWindow<'a> {
    /// `candles` must end with the current candle. Empty slices yield `None`.
    pub fn new(symbol: &'a str, timezone: Tz, candles: &'a [Candle]) -> Option<Self> {
        let current = candles.last()?;
        Some(Self {
            symbol,
            timezone,
            candles,
            current,
        })
    }

    pub fn symbol(&self) -> &'a str {
        self.symbol
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Oldest first; the last element is the current candle.
    pub fn candles(&self) -> &'a [Candle] {
        self.candles
    }

    pub fn current(&self) -> &'a Candle {
        self.current
    }

    /// Candles before the current one.
    pub fn previous(&self) -> &'a [Candle] {
        &self.candles[..self.candles.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn local_time(&self) -> DateTime<Tz> {
        self.current.timestamp_local(self.timezone)
    }

    pub fn local_time_of_day(&self) -> NaiveTime {
        self.local_time().time()
    }
}

/// Trading logic plugged into the engine.
///
/// Methods take `&mut self` so strategies may keep per-symbol state. Errors
/// (and panics) are caught by the engine, logged, counted, and treated as
/// "no signal" / "keep the position".
pub trait StrategyPort {
    fn name(&self) -> &str {
        "strategy"
    }

    /// Name plus parameters. Part of the run id, so two parameterisations
    /// of one strategy never share an id.
    fn fingerprint(&self) -> String {
        self.name().to_string()
    }

    fn generate_signal(&mut self, window: &HistoryWindow<'_>) -> Result<Signal, StrategyFault>;

    fn should_close(
        &mut self,
        _position: &Position,
        _window: &HistoryWindow<'_>,
    ) -> Result<ExitDecision, StrategyFault> {
        Ok(ExitDecision::hold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandleOrigin, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn make_candles(n: i64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        (0..n)
            .map(|i| {
                let ts = base + Duration::minutes(i);
                Candle {
                    symbol: "AAPL".into(),
                    timeframe: Timeframe::M1,
                    timestamp_utc: ts,
                    open: 100.0,
                    high: 101.0,
                    low: 99.0,
                    close: 100.0 + i as f64,
                    volume: 10.0,
                    source: CandleOrigin::LiveFetch,
                    last_updated_utc: ts,
                }
            })
            .collect()
    }

    #[test]
    fn window_exposes_current_and_previous() {
        let candles = make_candles(3);
        let w = HistoryWindow::new("AAPL", chrono_tz::America::New_York, &candles).unwrap();
        assert_eq!(w.current().close, 102.0);
        assert_eq!(w.previous().len(), 2);
        assert_eq!(w.local_time_of_day(), NaiveTime::from_hms_opt(9, 32, 0).unwrap());
    }

    #[test]
    fn empty_window_is_not_constructible() {
        assert!(HistoryWindow::new("AAPL", chrono_tz::UTC, &[]).is_none());
    }

    struct Never;

    impl StrategyPort for Never {
        fn generate_signal(&mut self, _: &HistoryWindow<'_>) -> Result<Signal, StrategyFault> {
            Ok(Signal::none("never trades"))
        }
    }

    #[test]
    fn default_should_close_holds() {
        let candles = make_candles(1);
        let w = HistoryWindow::new("AAPL", chrono_tz::UTC, &candles).unwrap();
        let pos = Position {
            symbol: "AAPL".into(),
            side: crate::domain::Side::Long,
            entry_price: 100.0,
            stop_loss: 99.0,
            take_profit: 102.0,
            size: 1.0,
            entry_time_utc: candles[0].timestamp_utc,
        };
        let mut s = Never;
        assert!(!s.should_close(&pos, &w).unwrap().close);
        assert!(!s.generate_signal(&w).unwrap().valid);
        assert_eq!(s.name(), "strategy");
    }
}
