//! Trade ledger export (CSV), one row per closed trade.

use anyhow::{Context, Result};
use barwise_core::domain::Trade;
use chrono::SecondsFormat;
use chrono_tz::Tz;

use super::fmt_utc;

const HEADER: [&str; 16] = [
    "run_id",
    "symbol",
    "side",
    "entry_time_utc",
    "entry_time_local",
    "entry_price",
    "stop_loss",
    "take_profit",
    "size",
    "exit_time_utc",
    "exit_time_local",
    "exit_price",
    "exit_reason",
    "pnl",
    "fees",
    "net_pnl",
];

pub(super) fn render_trades_csv(run_id: &str, trades: &[Trade], tz: Tz) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER).context("failed to write trades header")?;
    for trade in trades {
        writer
            .write_record([
                run_id.to_string(),
                trade.symbol.clone(),
                trade.side.as_str().to_string(),
                fmt_utc(trade.entry_time_utc),
                trade
                    .entry_time_local(tz)
                    .to_rfc3339_opts(SecondsFormat::Secs, false),
                trade.entry_price.to_string(),
                trade.stop_loss.to_string(),
                trade.take_profit.to_string(),
                trade.size.to_string(),
                fmt_utc(trade.exit_time_utc),
                trade
                    .exit_time_local(tz)
                    .to_rfc3339_opts(SecondsFormat::Secs, false),
                trade.exit_price.to_string(),
                trade.exit_reason.as_str().to_string(),
                trade.pnl.to_string(),
                trade.fees.to_string(),
                trade.net_pnl().to_string(),
            ])
            .with_context(|| format!("failed to write trade row for {}", trade.symbol))?;
    }
    writer.into_inner().context("failed to flush trades CSV")
}
