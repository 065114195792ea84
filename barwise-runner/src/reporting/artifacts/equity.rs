//! Equity curve export (CSV).

use anyhow::{Context, Result};
use barwise_core::domain::EquityCurve;

use super::fmt_utc;

pub(super) fn render_equity_csv(curve: &EquityCurve) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["timestamp_utc", "equity"])
        .context("failed to write equity header")?;
    for point in curve.points() {
        writer
            .write_record([fmt_utc(point.timestamp_utc), point.equity.to_string()])
            .context("failed to write equity row")?;
    }
    writer.into_inner().context("failed to flush equity CSV")
}
