//! Criterion benchmarks for barwise hot paths.
//!
//! Benchmarks:
//! 1. Bar event loop (full backtest over synthetic intraday candles)
//! 2. Gap detection over long timestamp series
//! 3. Candle store merge-write and read

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeMap;

use barwise_core::broker::TieBreak;
use barwise_core::data::{find_gaps, CandleSource, CandleStore, SyntheticSource};
use barwise_core::domain::{Candle, Signal, Timeframe};
use barwise_core::engine::{
    run_backtest, BacktestConfig, FeeSchedule, RunLimits, SlippageModel,
};
use barwise_core::scheduler::TimeWindow;
use barwise_core::strategy::{HistoryWindow, StrategyPort};
use barwise_core::StrategyFault;

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
}

fn make_candles(symbols: &[String], days: i64) -> BTreeMap<String, Vec<Candle>> {
    let source = SyntheticSource::new(7);
    symbols
        .iter()
        .map(|s| {
            let candles = source
                .fetch(s, Timeframe::M5, start(), start() + Duration::days(days))
                .unwrap();
            (s.clone(), candles)
        })
        .collect()
}

fn make_config(symbols: Vec<String>, days: i64) -> BacktestConfig {
    BacktestConfig {
        symbols,
        timeframe: Timeframe::M5,
        start_utc: start(),
        end_utc: start() + Duration::days(days),
        timezone: chrono_tz::America::New_York,
        entry_window: TimeWindow::parse("09:30", "15:30").unwrap(),
        force_close_window: TimeWindow::parse("15:50", "16:00").unwrap(),
        risk_fraction: 0.01,
        max_leverage: 2.0,
        fees: FeeSchedule { fee_fraction: 0.0005 },
        slippage: SlippageModel { fraction: 0.0002 },
        daily_quota: 3,
        strict: true,
        initial_capital: 100_000.0,
        tie_break: TieBreak::StopFirst,
        history_window: 50,
    }
}

/// Breaks out of the previous bar's range; enough work to touch the window.
struct PrevBarBreakout;

impl StrategyPort for PrevBarBreakout {
    fn generate_signal(&mut self, window: &HistoryWindow<'_>) -> Result<Signal, StrategyFault> {
        let Some(prev) = window.previous().last() else {
            return Ok(Signal::none("warmup"));
        };
        let c = window.current();
        if c.close > prev.high {
            Ok(Signal::long(c.close, prev.low, c.close + 2.0 * (c.close - prev.low), "breakout"))
        } else {
            Ok(Signal::none("inside"))
        }
    }
}

// ── 1. Bar Event Loop ────────────────────────────────────────────────

fn bench_bar_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("bar_event_loop");

    for &days in &[5i64, 20, 60] {
        let symbols = vec!["BENCH".to_string()];
        let candles = make_candles(&symbols, days);
        let config = make_config(symbols, days);
        group.bench_with_input(BenchmarkId::new("breakout_days", days), &days, |b, _| {
            b.iter(|| {
                run_backtest(
                    black_box(&config),
                    black_box(&candles),
                    &mut PrevBarBreakout,
                    &RunLimits::none(),
                )
            });
        });
    }

    let symbols: Vec<String> = (0..10).map(|i| format!("SYM{i}")).collect();
    let candles = make_candles(&symbols, 20);
    let config = make_config(symbols, 20);
    group.bench_function("10_symbols_20_days", |b| {
        b.iter(|| {
            run_backtest(
                black_box(&config),
                black_box(&candles),
                &mut PrevBarBreakout,
                &RunLimits::none(),
            )
        });
    });

    group.finish();
}

// ── 2. Gap Detection ─────────────────────────────────────────────────

fn bench_gaps(c: &mut Criterion) {
    let mut group = c.benchmark_group("gap_detection");
    let stamps: Vec<DateTime<Utc>> = (0..100_000i64)
        .filter(|i| i % 97 != 0)
        .map(|i| start() + Duration::minutes(i))
        .collect();
    group.bench_function("100k_minutes", |b| {
        b.iter(|| find_gaps(black_box(&stamps), Duration::minutes(1), 1.5));
    });
    group.finish();
}

// ── 3. Candle Store ──────────────────────────────────────────────────

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("candle_store");
    group.sample_size(20);

    let dir = tempfile::tempdir().unwrap();
    let store = CandleStore::new(dir.path(), chrono_tz::America::New_York);
    let candles = SyntheticSource::new(3)
        .fetch("BENCH", Timeframe::M1, start(), start() + Duration::days(5))
        .unwrap();

    group.bench_function("write_5_days_1m", |b| {
        b.iter(|| store.write("BENCH", Timeframe::M1, black_box(&candles)).unwrap());
    });
    group.bench_function("read_5_days_1m", |b| {
        b.iter(|| store.read("BENCH", Timeframe::M1).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_bar_loop, bench_gaps, bench_store);
criterion_main!(benches);
