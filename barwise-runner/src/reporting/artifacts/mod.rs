//! Artifact manager for persisting run outputs.
//!
//! Layout per run: `{output_dir}/{run_id}/{trades.csv, equity.csv, summary.json}`.
//! Every file is written to a `.tmp` sibling first and renamed into place,
//! so a reader never observes a half-written artifact.

mod equity;
mod summary;
mod trades;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::runner::RunOutcome;

pub use summary::RunSummary;

/// Artifact paths returned after export.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub run_dir: PathBuf,
    pub trades_csv: PathBuf,
    pub equity_csv: PathBuf,
    pub summary_json: PathBuf,
}

/// Manages writing all artifacts for a run.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    output_dir: PathBuf,
}

impl ArtifactManager {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("failed to create artifact directory {}", output_dir.display())
        })?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save complete run artifacts. Re-saving the same run overwrites in place.
    pub fn save_run(&self, outcome: &RunOutcome) -> Result<ArtifactPaths> {
        let run_dir = self.output_dir.join(outcome.run_id());
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create run directory {}", run_dir.display()))?;
        let tz = outcome.config.backtest.timezone;

        let trades_csv = run_dir.join("trades.csv");
        write_atomic(&trades_csv, &trades::render_trades_csv(outcome.run_id(), &outcome.result.trades, tz)?)?;

        let equity_csv = run_dir.join("equity.csv");
        write_atomic(&equity_csv, &equity::render_equity_csv(&outcome.result.equity_curve)?)?;

        let summary_json = run_dir.join("summary.json");
        let summary = RunSummary::from_outcome(outcome);
        let json = serde_json::to_vec_pretty(&summary).context("failed to serialize run summary")?;
        write_atomic(&summary_json, &json)?;

        log::info!("saved run {} to {}", outcome.run_id(), run_dir.display());
        Ok(ArtifactPaths {
            run_dir,
            trades_csv,
            equity_csv,
            summary_json,
        })
    }
}

/// Write `bytes` to `{path}.tmp`, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

/// RFC 3339 with second precision and a `Z` suffix.
pub(crate) fn fmt_utc(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
