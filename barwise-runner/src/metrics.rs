//! Performance metrics: pure functions over a run's ledger and equity curve.
//!
//! Every metric is a pure function: trades and/or equity points in, scalar out.
//! The equity curve only moves at trade closes, so return-based metrics
//! (Sharpe) are per-close, annualized by the observed close frequency.

use barwise_core::domain::{EquityCurve, EquityPoint, Trade};
use barwise_core::engine::BacktestConfig;
use serde::{Deserialize, Serialize};

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Aggregate performance metrics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub initial_capital: f64,
    pub final_equity: f64,
    /// `final_equity − initial_capital`.
    pub total_return: f64,
    /// `total_return / initial_capital`.
    pub total_return_pct: f64,
    #[serde(with = "non_finite")]
    pub cagr: f64,
    /// Largest peak-to-trough decline, in currency.
    pub max_drawdown: f64,
    /// Largest peak-to-trough decline as a fraction of the peak.
    pub max_drawdown_pct: f64,
    #[serde(with = "non_finite")]
    pub sharpe: f64,
    pub win_rate: f64,
    #[serde(with = "non_finite")]
    pub profit_factor: f64,
    /// Mean net PnL per trade.
    pub expectancy: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_fees: f64,
}

impl PerformanceMetrics {
    pub fn compute(trades: &[Trade], equity_curve: &EquityCurve, config: &BacktestConfig) -> Self {
        let initial_capital = config.initial_capital;
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);
        let total_return = final_equity - initial_capital;
        let (max_drawdown, max_drawdown_pct) = max_drawdown(equity_curve.points());

        Self {
            initial_capital,
            final_equity,
            total_return,
            total_return_pct: if initial_capital > 0.0 {
                total_return / initial_capital
            } else {
                0.0
            },
            cagr: cagr(equity_curve.points()),
            max_drawdown,
            max_drawdown_pct,
            sharpe: sharpe_ratio(equity_curve.points()),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            expectancy: expectancy(trades),
            largest_win: trades.iter().map(Trade::net_pnl).fold(0.0, f64::max),
            largest_loss: trades.iter().map(Trade::net_pnl).fold(0.0, f64::min),
            trade_count: trades.len(),
            winning_trades: trades.iter().filter(|t| t.is_winner()).count(),
            losing_trades: trades.iter().filter(|t| t.net_pnl() < 0.0).count(),
            total_fees: trades.iter().map(|t| t.fees).sum(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Years between the first and last equity point.
pub fn elapsed_years(points: &[EquityPoint]) -> f64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => {
            let secs = (last.timestamp_utc - first.timestamp_utc).num_milliseconds() as f64 / 1000.0;
            secs / SECONDS_PER_YEAR
        }
        _ => 0.0,
    }
}

/// Compound annual growth rate over the first→last point span.
///
/// Returns 0.0 for fewer than two points, a zero-length span or a wiped-out
/// account. Very short spans can legitimately produce huge or infinite values.
pub fn cagr(points: &[EquityPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let initial = points[0].equity;
    let final_eq = points[points.len() - 1].equity;
    let years = elapsed_years(points);
    if initial <= 0.0 || final_eq <= 0.0 || years <= 0.0 {
        return 0.0;
    }
    (final_eq / initial).powf(1.0 / years) - 1.0
}

/// `(absolute, fraction)` of the deepest peak-to-trough decline.
pub fn max_drawdown(points: &[EquityPoint]) -> (f64, f64) {
    let mut peak = f64::MIN;
    let mut worst_abs = 0.0_f64;
    let mut worst_pct = 0.0_f64;
    for p in points {
        peak = peak.max(p.equity);
        let dd = peak - p.equity;
        worst_abs = worst_abs.max(dd);
        if peak > 0.0 {
            worst_pct = worst_pct.max(dd / peak);
        }
    }
    (worst_abs, worst_pct)
}

/// Simple returns between consecutive equity points.
pub fn close_returns(points: &[EquityPoint]) -> Vec<f64> {
    points
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                (w[1].equity - w[0].equity) / w[0].equity
            } else {
                0.0
            }
        })
        .collect()
}

/// Annualized Sharpe of per-close returns (zero risk-free rate).
///
/// Periods per year = number of returns / elapsed years. Returns 0.0 with
/// fewer than two returns, zero variance or a zero-length span.
pub fn sharpe_ratio(points: &[EquityPoint]) -> f64 {
    let returns = close_returns(points);
    if returns.len() < 2 {
        return 0.0;
    }
    let years = elapsed_years(points);
    if years <= 0.0 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    let periods_per_year = returns.len() as f64 / years;
    mean_f64(&returns) / std * periods_per_year.sqrt()
}

pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross net-profit over gross net-loss.
///
/// `+∞` with wins and no losses; `0` with losses only or no trades.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().map(Trade::net_pnl).filter(|p| *p > 0.0).sum();
    let gross_loss: f64 = trades
        .iter()
        .map(Trade::net_pnl)
        .filter(|p| *p < 0.0)
        .map(f64::abs)
        .sum();
    if gross_loss == 0.0 {
        return if gross_profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    gross_profit / gross_loss
}

pub fn expectancy(trades: &[Trade]) -> f64 {
    let pnl: Vec<f64> = trades.iter().map(Trade::net_pnl).collect();
    mean_f64(&pnl)
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Serde for floats that may be infinite or NaN: those become the strings
/// `"inf"`, `"-inf"` and `"nan"`, finite values stay numbers.
pub mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            s.serialize_str("nan")
        } else if *value == f64::INFINITY {
            s.serialize_str("inf")
        } else if *value == f64::NEG_INFINITY {
            s.serialize_str("-inf")
        } else {
            s.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(t) => match t.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!(
                    "expected a number, \"inf\", \"-inf\" or \"nan\", got \"{other}\""
                ))),
            },
        }
    }
}
