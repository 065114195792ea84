//! Property tests for engine and storage invariants.
//!
//! Uses proptest to verify:
//! 1. Scheduler rules: quota never exceeded, entries only inside the entry window
//! 2. Equity accounting: final equity equals initial plus net trade P&L
//! 3. Determinism: identical inputs give identical run ids and trades
//! 4. Store idempotence: re-writing a batch never changes the file
//! 5. Gap exactness: gaps plus present bars tile the observed span
//! 6. Slippage is always adverse

use barwise_core::broker::{CostModel, TieBreak};
use barwise_core::data::{find_gaps, CandleSource, CandleStore, SyntheticSource};
use barwise_core::domain::{Candle, CandleOrigin, Side, Signal, Timeframe};
use barwise_core::engine::{
    run_backtest, BacktestConfig, FeeSchedule, RunLimits, RunResult, RunStatus, SlippageModel,
};
use barwise_core::scheduler::TimeWindow;
use barwise_core::strategy::{HistoryWindow, StrategyPort};
use barwise_core::StrategyFault;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::America::New_York;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

// ── Fixtures ─────────────────────────────────────────────────────────

/// Signals a bracket on every bar whose minute is a multiple of `every`.
#[derive(Debug)]
struct Periodic {
    every: u32,
    stop_pct: f64,
    target_pct: f64,
    short: bool,
}

impl StrategyPort for Periodic {
    fn generate_signal(&mut self, window: &HistoryWindow<'_>) -> Result<Signal, StrategyFault> {
        use chrono::Timelike;
        if window.local_time_of_day().minute() % self.every != 0 {
            return Ok(Signal::none("waiting"));
        }
        let c = window.current().close;
        Ok(if self.short {
            Signal::short(c, c * (1.0 + self.stop_pct), c * (1.0 - self.target_pct), "periodic")
        } else {
            Signal::long(c, c * (1.0 - self.stop_pct), c * (1.0 + self.target_pct), "periodic")
        })
    }
}

fn make_config(quota: u32, slippage: f64, fee: f64, tie_break: TieBreak) -> BacktestConfig {
    BacktestConfig {
        symbols: vec!["AAPL".into(), "MSFT".into()],
        timeframe: Timeframe::M5,
        start_utc: Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap(),
        end_utc: Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap(),
        timezone: New_York,
        entry_window: TimeWindow::parse("09:30", "15:30").unwrap(),
        force_close_window: TimeWindow::parse("15:50", "16:00").unwrap(),
        risk_fraction: 0.02,
        max_leverage: 2.0,
        fees: FeeSchedule { fee_fraction: fee },
        slippage: SlippageModel { fraction: slippage },
        daily_quota: quota,
        strict: true,
        initial_capital: 25_000.0,
        tie_break,
        history_window: 50,
    }
}

fn synthetic_candles(seed: u64, days: i64) -> BTreeMap<String, Vec<Candle>> {
    let source = SyntheticSource::new(seed);
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
    ["AAPL", "MSFT"]
        .into_iter()
        .map(|symbol| {
            let candles = source
                .fetch(symbol, Timeframe::M5, start, start + Duration::days(days))
                .unwrap();
            (symbol.to_string(), candles)
        })
        .collect()
}

fn arb_tie_break() -> impl Strategy<Value = TieBreak> {
    prop_oneof![
        Just(TieBreak::StopFirst),
        Just(TieBreak::TargetFirst),
        Just(TieBreak::OhlcPath),
    ]
}

fn arb_strategy() -> impl Strategy<Value = Periodic> {
    (
        prop_oneof![Just(5u32), Just(15), Just(30)],
        0.001..0.02_f64,
        0.001..0.03_f64,
        any::<bool>(),
    )
        .prop_map(|(every, stop_pct, target_pct, short)| Periodic {
            every,
            stop_pct,
            target_pct,
            short,
        })
}

fn run(
    seed: u64,
    quota: u32,
    slippage: f64,
    fee: f64,
    tie_break: TieBreak,
    strategy: &mut Periodic,
) -> (BacktestConfig, RunResult) {
    let config = make_config(quota, slippage, fee, tie_break);
    let result = run_backtest(&config, &synthetic_candles(seed, 3), strategy, &RunLimits::none());
    (config, result)
}

// ── 1. Scheduler rules ───────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// No symbol ever opens more than `daily_quota` positions per local day,
    /// and every entry lies inside the entry window and outside force-close.
    #[test]
    fn quota_and_windows_hold(
        seed in 0u64..1_000,
        quota in 1u32..4,
        tie_break in arb_tie_break(),
        mut strategy in arb_strategy(),
    ) {
        let (config, result) = run(seed, quota, 0.0005, 0.0002, tie_break, &mut strategy);
        prop_assert_eq!(&result.status, &RunStatus::Completed);

        let mut per_day: BTreeMap<(String, NaiveDate), u32> = BTreeMap::new();
        for trade in &result.trades {
            let entry = trade.entry_time_local(New_York);
            prop_assert!(config.entry_window.contains(entry.time()));
            prop_assert!(!config.force_close_window.contains(entry.time()));
            *per_day.entry((trade.symbol.clone(), entry.date_naive())).or_default() += 1;
        }
        for (key, count) in &per_day {
            prop_assert!(*count <= quota, "{:?} opened {} times", key, count);
        }
        prop_assert!(result.open_positions.is_empty());
    }
}

// ── 2. Equity accounting ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn final_equity_matches_trade_ledger(
        seed in 0u64..1_000,
        slippage in 0.0..0.002_f64,
        fee in 0.0..0.001_f64,
        tie_break in arb_tie_break(),
        mut strategy in arb_strategy(),
    ) {
        let (config, result) = run(seed, 2, slippage, fee, tie_break, &mut strategy);
        let expected = config.initial_capital
            + result.trades.iter().map(|t| t.pnl).sum::<f64>()
            - result.trades.iter().map(|t| t.fees).sum::<f64>();
        prop_assert_eq!(result.final_equity, expected);
        prop_assert_eq!(result.ledger_equity(), result.final_equity);

        let last = result.equity_curve.last().map(|p| p.equity);
        prop_assert_eq!(last, Some(result.final_equity));
        prop_assert_eq!(result.equity_curve.len(), result.trades.len() + 1);

        for trade in &result.trades {
            prop_assert!(trade.fees >= 0.0);
            prop_assert!(trade.size > 0.0);
            prop_assert!(trade.exit_time_utc >= trade.entry_time_utc);
        }
    }
}

// ── 3. Determinism ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn identical_inputs_identical_runs(seed in 0u64..1_000, tie_break in arb_tie_break()) {
        let mut a = Periodic { every: 15, stop_pct: 0.004, target_pct: 0.006, short: false };
        let mut b = Periodic { every: 15, stop_pct: 0.004, target_pct: 0.006, short: false };
        let (_, first) = run(seed, 2, 0.0005, 0.0001, tie_break, &mut a);
        let (_, second) = run(seed, 2, 0.0005, 0.0001, tie_break, &mut b);
        prop_assert_eq!(&first.run_id, &second.run_id);
        prop_assert_eq!(&first.trades, &second.trades);
        prop_assert_eq!(first.final_equity.to_bits(), second.final_equity.to_bits());
    }
}

// ── 4. Store idempotence ─────────────────────────────────────────────

fn minute(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap() + Duration::minutes(offset)
}

fn make_candle(offset: i64) -> Candle {
    let close = 50.0 + (offset % 17) as f64;
    Candle {
        symbol: "AAPL".into(),
        timeframe: Timeframe::M1,
        timestamp_utc: minute(offset),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 10.0,
        source: CandleOrigin::LiveFetch,
        last_updated_utc: minute(offset + 1),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rewriting_is_idempotent(offsets in prop::collection::btree_set(0i64..500, 1..80)) {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path(), New_York);
        // Unsorted input order must not matter.
        let batch: Vec<Candle> = offsets.iter().rev().map(|o| make_candle(*o)).collect();

        store.write("AAPL", Timeframe::M1, &batch).unwrap();
        let first = std::fs::read(store.path_for("AAPL", Timeframe::M1)).unwrap();
        store.write("AAPL", Timeframe::M1, &batch).unwrap();
        let second = std::fs::read(store.path_for("AAPL", Timeframe::M1)).unwrap();
        prop_assert_eq!(first, second);

        let (candles, last) = store.read("AAPL", Timeframe::M1).unwrap();
        let stamps: Vec<_> = candles.iter().map(|c| c.timestamp_utc).collect();
        let expected: Vec<_> = offsets.iter().map(|o| minute(*o)).collect();
        prop_assert_eq!(stamps, expected);
        prop_assert_eq!(last, offsets.iter().next_back().map(|o| minute(*o)));
    }
}

// ── 5. Gap exactness ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn gaps_tile_the_missing_bars(offsets in prop::collection::btree_set(0i64..300, 2..120)) {
        let stamps: Vec<_> = offsets.iter().map(|o| minute(*o)).collect();
        let gaps = find_gaps(&stamps, Duration::minutes(1), 1.5);

        let mut missing = BTreeSet::new();
        for gap in &gaps {
            let mut t = gap.start;
            while t <= gap.end {
                prop_assert!(missing.insert(t), "gap ranges overlap at {}", t);
                t += Duration::minutes(1);
            }
        }

        let first = *offsets.iter().next().unwrap();
        let last = *offsets.iter().next_back().unwrap();
        for o in first..=last {
            let present = offsets.contains(&o);
            prop_assert_eq!(present, !missing.contains(&minute(o)));
        }
    }
}

// ── 6. Slippage direction ────────────────────────────────────────────

proptest! {
    #[test]
    fn slippage_never_favours_the_trader(price in 1.0..10_000.0_f64, fraction in 0.0..0.05_f64) {
        let costs = CostModel::new(fraction, 0.0);
        for side in [Side::Long, Side::Short] {
            let entry = costs.entry_fill(price, side);
            let exit = costs.exit_fill(price, side);
            // Adverse: a long pays more and receives less, a short the reverse.
            prop_assert!(side.sign() * (entry - price) >= 0.0);
            prop_assert!(side.sign() * (price - exit) >= 0.0);
        }
    }
}
