//! Cost model: slippage and fees.
//!
//! Slippage is directional: buyers pay more, sellers receive less.
//! Fees are a fraction of traded notional, charged on both legs at close.

use crate::domain::Side;

/// Direction of a single fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillSide {
    Buy,
    Sell,
}

impl FillSide {
    /// The fill that opens a position on `side`.
    pub fn opening(side: Side) -> Self {
        match side {
            Side::Long => FillSide::Buy,
            Side::Short => FillSide::Sell,
        }
    }

    /// The fill that closes a position on `side`.
    pub fn closing(side: Side) -> Self {
        match side {
            Side::Long => FillSide::Sell,
            Side::Short => FillSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Slippage as a fraction of price, applied against the trader.
    pub slippage_fraction: f64,
    /// Fee as a fraction of notional, per leg.
    pub fee_fraction: f64,
}

impl CostModel {
    pub fn new(slippage_fraction: f64, fee_fraction: f64) -> Self {
        Self {
            slippage_fraction,
            fee_fraction,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn apply_slippage(&self, raw_price: f64, side: FillSide) -> f64 {
        if self.slippage_fraction == 0.0 {
            return raw_price;
        }
        match side {
            FillSide::Buy => raw_price * (1.0 + self.slippage_fraction),
            FillSide::Sell => raw_price * (1.0 - self.slippage_fraction),
        }
    }

    pub fn entry_fill(&self, raw_price: f64, side: Side) -> f64 {
        self.apply_slippage(raw_price, FillSide::opening(side))
    }

    pub fn exit_fill(&self, raw_price: f64, side: Side) -> f64 {
        self.apply_slippage(raw_price, FillSide::closing(side))
    }

    /// `fee_fraction × (entry notional + exit notional)`
    pub fn round_trip_fees(&self, entry_notional: f64, exit_notional: f64) -> f64 {
        self.fee_fraction * (entry_notional.abs() + exit_notional.abs())
    }
}
