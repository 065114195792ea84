//! Domain types: candles, signals, positions, trades, equity.

pub mod candle;
pub mod equity;
pub mod position;
pub mod signal;
pub mod trade;

pub use candle::{Candle, CandleOrigin, Timeframe};
pub use equity::{EquityCurve, EquityPoint};
pub use position::Position;
pub use signal::{ExitDecision, Side, Signal};
pub use trade::{ExitReason, Trade};
