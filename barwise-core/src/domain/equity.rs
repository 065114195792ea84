//! Equity curve: realized equity sampled at trade closes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp_utc: DateTime<Utc>,
    pub equity: f64,
}

/// Ordered `(timestamp_utc, equity)` points.
///
/// Equity only changes when a trade closes; there is no mark-to-market
/// while a position is open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquityCurve {
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, timestamp_utc: DateTime<Utc>, equity: f64) {
        debug_assert!(
            self.points
                .last()
                .map_or(true, |p| p.timestamp_utc <= timestamp_utc),
            "equity points must be appended in time order"
        );
        self.points.push(EquityPoint {
            timestamp_utc,
            equity,
        });
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.equity).collect()
    }

    pub fn first(&self) -> Option<&EquityPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&EquityPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<Vec<EquityPoint>> for EquityCurve {
    fn from(points: Vec<EquityPoint>) -> Self {
        Self { points }
    }
}
