//! Position simulator: sizing, bar-by-bar exits, realized equity.
//!
//! At most one position per symbol. Equity only moves when a trade closes.
//! Gross PnL and fees are summed separately, so equity is always exactly
//! `initial + Σpnl − Σfees` over the closed trades in close order.

use super::cost_model::CostModel;
use super::tie_break::TieBreak;
use crate::domain::{Candle, ExitReason, Position, Signal, Trade};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why `open` refused a signal. Rejections are counted, never fatal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Rejection {
    #[error("{symbol} already has an open position")]
    AlreadyOpen { symbol: String },

    #[error("invalid signal for {symbol}: {reason}")]
    InvalidSignal { symbol: String, reason: String },

    #[error("computed size {size} for {symbol} is not positive")]
    NonPositiveSize { symbol: String, size: f64 },
}

/// Result of advancing one symbol by one candle.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// No open position for the candle's symbol.
    Flat,
    /// Position still open after the candle.
    Held,
    Closed(Trade),
}

#[derive(Debug, Clone)]
pub struct PositionSimulator {
    positions: BTreeMap<String, Position>,
    initial_capital: f64,
    realized_pnl: f64,
    total_fees: f64,
    risk_fraction: f64,
    max_leverage: f64,
    costs: CostModel,
    tie_break: TieBreak,
}

impl PositionSimulator {
    pub fn new(
        initial_capital: f64,
        risk_fraction: f64,
        max_leverage: f64,
        costs: CostModel,
        tie_break: TieBreak,
    ) -> Self {
        Self {
            positions: BTreeMap::new(),
            initial_capital,
            realized_pnl: 0.0,
            total_fees: 0.0,
            risk_fraction,
            max_leverage,
            costs,
            tie_break,
        }
    }

    pub fn equity(&self) -> f64 {
        self.initial_capital + self.realized_pnl - self.total_fees
    }

    /// Σ gross PnL of closed trades.
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    /// Open positions ordered by symbol.
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Units for a trade entered at `fill` with the given stop.
    ///
    /// `min(equity × risk / |fill − stop|, equity × leverage / fill)`
    pub fn position_size(&self, fill: f64, stop: f64) -> f64 {
        let risk_per_unit = (fill - stop).abs();
        if risk_per_unit <= 0.0 || fill <= 0.0 {
            return 0.0;
        }
        let equity = self.equity();
        let by_risk = equity * self.risk_fraction / risk_per_unit;
        let by_leverage = equity * self.max_leverage / fill;
        by_risk.min(by_leverage)
    }

    pub fn open(
        &mut self,
        symbol: &str,
        signal: &Signal,
        ts_utc: DateTime<Utc>,
    ) -> Result<Position, Rejection> {
        if self.positions.contains_key(symbol) {
            return Err(Rejection::AlreadyOpen {
                symbol: symbol.to_string(),
            });
        }
        signal.check().map_err(|reason| Rejection::InvalidSignal {
            symbol: symbol.to_string(),
            reason,
        })?;

        let fill = self.costs.entry_fill(signal.entry_price, signal.side);
        let size = self.position_size(fill, signal.stop_loss);
        if !(size.is_finite() && size > 0.0) {
            return Err(Rejection::NonPositiveSize {
                symbol: symbol.to_string(),
                size,
            });
        }

        let position = Position {
            symbol: symbol.to_string(),
            side: signal.side,
            entry_price: fill,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            size,
            entry_time_utc: ts_utc,
        };
        log::debug!(
            "open {} {symbol} x{size:.4} @ {fill:.4} (stop {}, target {}) at {ts_utc}",
            signal.side,
            signal.stop_loss,
            signal.take_profit
        );
        self.positions.insert(symbol.to_string(), position.clone());
        Ok(position)
    }

    /// Advance the candle's symbol by one bar.
    ///
    /// Order: forced close at the close, then stop/target resolution, else hold.
    pub fn step(&mut self, candle: &Candle, force_close: bool) -> StepOutcome {
        let Some(position) = self.positions.get(&candle.symbol) else {
            return StepOutcome::Flat;
        };

        let exit = if force_close {
            Some((ExitReason::ForcedClose, candle.close))
        } else {
            let stop_hit = position.stop_touched(candle.low, candle.high);
            let target_hit = position.target_touched(candle.low, candle.high);
            match (stop_hit, target_hit) {
                (true, true) => Some(self.tie_break.resolve(position, candle)),
                (true, false) => Some((ExitReason::StopLoss, position.stop_loss)),
                (false, true) => Some((ExitReason::TakeProfit, position.take_profit)),
                (false, false) => None,
            }
        };

        match exit {
            Some((reason, price)) => self
                .close(&candle.symbol, price, candle.timestamp_utc, reason)
                .map_or(StepOutcome::Flat, StepOutcome::Closed),
            None => StepOutcome::Held,
        }
    }

    /// Close the symbol's position at `raw_price` (before slippage).
    pub fn close(
        &mut self,
        symbol: &str,
        raw_price: f64,
        ts_utc: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<Trade> {
        let position = self.positions.remove(symbol)?;
        let fill = self.costs.exit_fill(raw_price, position.side);
        let fees = self
            .costs
            .round_trip_fees(position.notional(), fill * position.size);
        let trade = Trade::from_position(position, fill, ts_utc, reason, fees);
        self.realized_pnl += trade.pnl;
        self.total_fees += trade.fees;
        log::debug!(
            "close {symbol} @ {fill:.4} ({reason}) pnl {:.2} fees {:.2} -> equity {:.2}",
            trade.pnl,
            trade.fees,
            self.equity()
        );
        Some(trade)
    }
}
