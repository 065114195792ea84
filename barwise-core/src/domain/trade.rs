//! Trade: a closed position, appended once to the run ledger.

use super::position::Position;
use super::signal::Side;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    ForcedClose,
    StrategyExit,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::ForcedClose => "forced_close",
            ExitReason::StrategyExit => "strategy_exit",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed round trip.
///
/// `pnl` is the gross price PnL; `fees` are reported separately so that
/// `final_equity == initial_capital + Σpnl − Σfees` holds exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub entry_time_utc: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_time_utc: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub fees: f64,
}

impl Trade {
    pub fn from_position(
        position: Position,
        exit_price: f64,
        exit_time_utc: DateTime<Utc>,
        exit_reason: ExitReason,
        fees: f64,
    ) -> Self {
        let pnl = position.pnl_at(exit_price);
        Self {
            symbol: position.symbol,
            side: position.side,
            entry_price: position.entry_price,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            size: position.size,
            entry_time_utc: position.entry_time_utc,
            exit_price,
            exit_time_utc,
            exit_reason,
            pnl,
            fees,
        }
    }

    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.fees
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl() > 0.0
    }

    pub fn entry_time_local(&self, tz: Tz) -> DateTime<Tz> {
        self.entry_time_utc.with_timezone(&tz)
    }

    pub fn exit_time_local(&self, tz: Tz) -> DateTime<Tz> {
        self.exit_time_utc.with_timezone(&tz)
    }

    /// Net return as a fraction of entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.size;
        if notional == 0.0 {
            return 0.0;
        }
        self.net_pnl() / notional
    }
}
