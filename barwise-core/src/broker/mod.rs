//! Simulated broker: fills, costs and open-position bookkeeping.

pub mod cost_model;
pub mod simulator;
pub mod tie_break;

pub use cost_model::{CostModel, FillSide};
pub use simulator::{PositionSimulator, Rejection, StepOutcome};
pub use tie_break::TieBreak;
