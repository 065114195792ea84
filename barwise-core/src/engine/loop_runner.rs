//! Candle-by-candle event loop: the heart of the backtesting engine.
//!
//! Every symbol's candles are merged into one sequence ordered by
//! `(timestamp_utc, symbol)`. For each candle:
//! 1. Cancellation / timeout check
//! 2. Integrity check (symbol, timeframe, OHLC sanity, strictly increasing time)
//! 3. OPEN: simulator step (forced close, stop/target), then strategy exit,
//!    then end-of-data close on the symbol's final candle
//! 4. FLAT: scheduler gate, strategy signal, simulator open, quota record

use super::cancel::RunLimits;
use super::config::BacktestConfig;
use super::state::{EngineError, RunCounters, RunResult, RunStatus};
use crate::broker::StepOutcome;
use crate::domain::{Candle, EquityCurve, ExitDecision, ExitReason, Signal};
use crate::error::{DataIntegrityError, StrategyFault};
use crate::scheduler::EntryPermission;
use crate::strategy::{HistoryWindow, StrategyPort};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// One symbol's candles inside `[start_utc, end_utc)`, in input order.
struct SymbolSeries {
    symbol: String,
    candles: Vec<Candle>,
}

/// Run a backtest.
///
/// `candles` maps symbol to its candles; symbols absent from the config are
/// ignored, configured symbols absent from the map simply never trade.
/// The function never panics on bad input: failures end up in
/// `RunResult::status` with every trade closed before the failure kept.
pub fn run_backtest(
    config: &BacktestConfig,
    candles: &BTreeMap<String, Vec<Candle>>,
    strategy: &mut dyn StrategyPort,
    limits: &RunLimits,
) -> RunResult {
    let series = select_series(config, candles);
    let run_id = compute_run_id(config, &strategy.fingerprint(), &series);

    let mut result = RunResult {
        run_id,
        status: RunStatus::Completed,
        trades: Vec::new(),
        equity_curve: EquityCurve::new(),
        initial_capital: config.initial_capital,
        final_equity: config.initial_capital,
        open_positions: Vec::new(),
        counters: RunCounters::default(),
    };

    if let Err(reason) = config.validate() {
        result.status = RunStatus::Failed(EngineError::InvalidConfig(reason));
        return result;
    }

    let mut scheduler = config.scheduler();
    let mut simulator = config.simulator();
    let mut last_seen: Vec<Option<DateTime<Utc>>> = vec![None; series.len()];
    let started = Instant::now();

    log::info!(
        "run {} ({}): {} symbols, {} candles, {} → {}",
        &result.run_id[..12],
        strategy.name(),
        series.len(),
        series.iter().map(|s| s.candles.len()).sum::<usize>(),
        config.start_utc,
        config.end_utc
    );

    for (sym_idx, idx) in MergedCursor::new(&series) {
        if limits.is_cancelled() {
            log::warn!("run {} cancelled", result.run_id);
            result.status = RunStatus::Cancelled;
            break;
        }
        if limits.timeout.is_some_and(|t| started.elapsed() >= t) {
            log::warn!("run {} timed out", result.run_id);
            result.status = RunStatus::TimedOut;
            break;
        }

        let s = &series[sym_idx];
        let candle = &s.candles[idx];
        if let Err(e) = check_candle(config, &s.symbol, candle, last_seen[sym_idx]) {
            log::error!("{e}");
            result.status = RunStatus::Failed(e.into());
            break;
        }
        last_seen[sym_idx] = Some(candle.timestamp_utc);

        let ts = candle.timestamp_utc;
        if result.equity_curve.is_empty() {
            result.equity_curve.push(ts, config.initial_capital);
        }
        result.counters.candles_processed += 1;

        let window_start = (idx + 1).saturating_sub(config.history_window);
        let Some(window) = HistoryWindow::new(&s.symbol, config.timezone, &s.candles[window_start..=idx])
        else {
            continue;
        };
        let is_final = idx + 1 == s.candles.len();

        if simulator.has_position(&s.symbol) {
            let force = scheduler.must_force_close(&s.symbol, ts);
            let mut closed = match simulator.step(candle, force) {
                StepOutcome::Closed(trade) => Some(trade),
                StepOutcome::Held | StepOutcome::Flat => None,
            };

            if closed.is_none() {
                if let Some(position) = simulator.position(&s.symbol).cloned() {
                    let decision = guarded(&s.symbol, ts, || strategy.should_close(&position, &window))
                        .unwrap_or_else(|fault| {
                            log::warn!("{fault}");
                            result.counters.strategy_faults += 1;
                            ExitDecision::hold()
                        });
                    if decision.close {
                        log::debug!("{} strategy exit: {}", s.symbol, decision.reason);
                        closed = simulator.close(&s.symbol, candle.close, ts, ExitReason::StrategyExit);
                    }
                }
            }

            if closed.is_none() && is_final {
                closed = simulator.close(&s.symbol, candle.close, ts, ExitReason::EndOfData);
            }

            if let Some(trade) = closed {
                result.equity_curve.push(ts, simulator.equity());
                result.trades.push(trade);
            }
            continue;
        }

        if is_final {
            continue;
        }

        if let EntryPermission::Denied(reason) = scheduler.can_enter(&s.symbol, ts) {
            log::trace!("{} at {ts}: entry denied ({reason})", s.symbol);
            result.counters.entries_denied += 1;
            continue;
        }

        let signal = match guarded(&s.symbol, ts, || strategy.generate_signal(&window)) {
            Ok(signal) => signal,
            Err(fault) => {
                log::warn!("{fault}");
                result.counters.strategy_faults += 1;
                Signal::none("strategy fault")
            }
        };
        if !signal.valid {
            continue;
        }
        result.counters.signals += 1;

        match simulator.open(&s.symbol, &signal, ts) {
            Ok(_) => {
                result.counters.entries += 1;
                if let Err(e) = scheduler.record_entry(&s.symbol, ts) {
                    log::error!("{e}");
                    result.status = RunStatus::Failed(e.into());
                    break;
                }
            }
            Err(rejection) => {
                log::debug!("{rejection}");
                result.counters.rejections += 1;
            }
        }
    }

    result.final_equity = simulator.equity();
    result.open_positions = simulator.open_positions();
    log::info!(
        "run {} {}: {} trades, final equity {:.2}",
        &result.run_id[..12],
        result.status.as_str(),
        result.trades.len(),
        result.final_equity
    );
    result
}

/// Configured symbols in name order, each filtered to the run's time range.
fn select_series(config: &BacktestConfig, candles: &BTreeMap<String, Vec<Candle>>) -> Vec<SymbolSeries> {
    config
        .sorted_symbols()
        .into_iter()
        .map(|symbol| {
            let selected = match candles.get(&symbol) {
                Some(all) => all
                    .iter()
                    .filter(|c| config.start_utc <= c.timestamp_utc && c.timestamp_utc < config.end_utc)
                    .cloned()
                    .collect(),
                None => {
                    log::warn!("no candles supplied for {symbol}");
                    Vec::new()
                }
            };
            SymbolSeries {
                symbol,
                candles: selected,
            }
        })
        .collect()
}

/// Identical config and candles give an identical id.
fn compute_run_id(config: &BacktestConfig, strategy: &str, series: &[SymbolSeries]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(config.digest().as_bytes());
    hasher.update(strategy.as_bytes());
    for s in series {
        hasher.update(s.symbol.as_bytes());
        hasher.update(&(s.candles.len() as u64).to_le_bytes());
        for c in &s.candles {
            hasher.update(c.timeframe.as_str().as_bytes());
            hasher.update(&c.timestamp_utc.timestamp_millis().to_le_bytes());
            for v in [c.open, c.high, c.low, c.close, c.volume] {
                hasher.update(&v.to_bits().to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn check_candle(
    config: &BacktestConfig,
    symbol: &str,
    candle: &Candle,
    previous: Option<DateTime<Utc>>,
) -> Result<(), DataIntegrityError> {
    let location = candle.timestamp_utc.to_rfc3339();
    if candle.symbol != symbol {
        return Err(DataIntegrityError::new(
            symbol,
            config.timeframe,
            location,
            format!("candle is labelled {}", candle.symbol),
        ));
    }
    if candle.timeframe != config.timeframe {
        return Err(DataIntegrityError::new(
            symbol,
            config.timeframe,
            location,
            format!("candle timeframe {} does not match run timeframe", candle.timeframe),
        ));
    }
    candle
        .validate()
        .map_err(|reason| DataIntegrityError::new(symbol, config.timeframe, location.clone(), reason))?;
    if let Some(prev) = previous {
        if candle.timestamp_utc <= prev {
            return Err(DataIntegrityError::new(
                symbol,
                config.timeframe,
                location,
                format!("timestamp is not after previous candle {}", prev.to_rfc3339()),
            ));
        }
    }
    Ok(())
}

/// Run a strategy call, turning panics into faults.
fn guarded<T>(
    symbol: &str,
    ts: DateTime<Utc>,
    call: impl FnOnce() -> Result<T, StrategyFault>,
) -> Result<T, StrategyFault> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "strategy panicked".to_string());
            Err(StrategyFault::new(symbol, ts, format!("panic: {message}")))
        }
    }
}

/// K-way merge over per-symbol series by `(timestamp_utc, symbol)`.
///
/// Each series is consumed in its own order, so an out-of-order candle is
/// surfaced to the integrity check rather than silently re-sorted.
struct MergedCursor<'a> {
    series: &'a [SymbolSeries],
    next: Vec<usize>,
    heap: BinaryHeap<Reverse<(DateTime<Utc>, usize)>>,
}

impl<'a> MergedCursor<'a> {
    fn new(series: &'a [SymbolSeries]) -> Self {
        let mut heap = BinaryHeap::new();
        for (i, s) in series.iter().enumerate() {
            if let Some(first) = s.candles.first() {
                heap.push(Reverse((first.timestamp_utc, i)));
            }
        }
        Self {
            series,
            next: vec![0; series.len()],
            heap,
        }
    }
}

impl Iterator for MergedCursor<'_> {
    /// `(series index, candle index)`
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((_, sym_idx)) = self.heap.pop()?;
        let idx = self.next[sym_idx];
        self.next[sym_idx] += 1;
        if let Some(following) = self.series[sym_idx].candles.get(idx + 1) {
            self.heap.push(Reverse((following.timestamp_utc, sym_idx)));
        }
        Some((sym_idx, idx))
    }
}
