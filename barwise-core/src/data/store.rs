//! Durable candle store: one CSV file per (symbol, timeframe).
//!
//! Layout: `{root}/symbol={SYMBOL}/{timeframe}.csv`
//!
//! Features:
//! - Idempotent merge keyed by `timestamp_utc`, last write wins
//! - Atomic writes (write to .tmp, rename into place)
//! - Per-key write lock; readers never block
//! - Strict validation on read: a bad row is an error naming the row
//! - Gap detection for targeted re-fetch

use super::gaps::{find_gaps, GapRange};
use crate::domain::{Candle, CandleOrigin, Timeframe};
use crate::error::DataIntegrityError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Column order of the persisted candle file.
pub const CANDLE_COLUMNS: [&str; 9] = [
    "timestamp_utc",
    "timestamp_local",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "source",
    "last_updated_utc",
];

/// Default multiple of the bar interval above which a delta counts as a gap.
pub const DEFAULT_GAP_TOLERANCE: f64 = 1.5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        StoreError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of a merge-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    /// Timestamps that were not stored before.
    pub inserted: usize,
    /// Timestamps whose stored candle was overwritten.
    pub replaced: usize,
    /// Candles in the file after the write.
    pub total: usize,
}

/// Summary of one stored key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStatus {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle_count: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

type StoreKey = (String, Timeframe);

/// The candle store. Share it between threads behind an `Arc`.
#[derive(Debug)]
pub struct CandleStore {
    root: PathBuf,
    timezone: Tz,
    gap_tolerance: f64,
    write_locks: Mutex<HashMap<StoreKey, Arc<Mutex<()>>>>,
}

#[derive(Serialize)]
struct CandleRow<'a> {
    timestamp_utc: String,
    timestamp_local: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    source: &'a str,
    last_updated_utc: String,
}

impl CandleStore {
    /// `timezone` only feeds the human-readable `timestamp_local` column.
    pub fn new(root: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            root: root.into(),
            timezone,
            gap_tolerance: DEFAULT_GAP_TOLERANCE,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_gap_tolerance(mut self, tolerance: f64) -> Self {
        self.gap_tolerance = tolerance;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn gap_tolerance(&self) -> f64 {
        self.gap_tolerance
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.root.join(format!("symbol={symbol}"))
    }

    /// `{root}/symbol={SYMBOL}/{timeframe}.csv`
    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{timeframe}.csv"))
    }

    fn lock_for(&self, symbol: &str, timeframe: Timeframe) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry((symbol.to_string(), timeframe))
            .or_default()
            .clone()
    }

    /// Load every stored candle for the key, ascending, plus the last timestamp.
    ///
    /// A key that was never written reads as empty.
    pub fn read(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<(Vec<Candle>, Option<DateTime<Utc>>), StoreError> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            return Ok((Vec::new(), None));
        }
        let candles = read_candle_file(&path, symbol, timeframe)?;
        let last = candles.last().map(|c| c.timestamp_utc);
        Ok((candles, last))
    }

    /// Merge `new_candles` into the stored series.
    ///
    /// Duplicate timestamps resolve to the copy written last, which makes
    /// the write idempotent and lets corrections replace past candles.
    pub fn write(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        new_candles: &[Candle],
    ) -> Result<WriteSummary, StoreError> {
        for (i, candle) in new_candles.iter().enumerate() {
            let location = format!("batch index {i} ({})", fmt_utc(candle.timestamp_utc));
            if candle.symbol != symbol || candle.timeframe != timeframe {
                return Err(DataIntegrityError::new(
                    symbol,
                    timeframe,
                    location,
                    format!(
                        "candle belongs to {}/{}",
                        candle.symbol, candle.timeframe
                    ),
                )
                .into());
            }
            candle
                .validate()
                .map_err(|reason| DataIntegrityError::new(symbol, timeframe, location, reason))?;
        }

        let lock = self.lock_for(symbol, timeframe);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let (existing, _) = self.read(symbol, timeframe)?;
        if new_candles.is_empty() {
            return Ok(WriteSummary {
                inserted: 0,
                replaced: 0,
                total: existing.len(),
            });
        }
        let mut merged: BTreeMap<DateTime<Utc>, Candle> = existing
            .into_iter()
            .map(|c| (c.timestamp_utc, c))
            .collect();

        let mut inserted = 0;
        let mut replaced = 0;
        let mut seen_in_batch: HashSet<DateTime<Utc>> = HashSet::new();
        for candle in new_candles {
            let previous = merged.insert(candle.timestamp_utc, candle.clone());
            let first_in_batch = seen_in_batch.insert(candle.timestamp_utc);
            if first_in_batch {
                if previous.is_some() {
                    replaced += 1;
                } else {
                    inserted += 1;
                }
            }
        }

        let path = self.path_for(symbol, timeframe);
        let dir = self.symbol_dir(symbol);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        self.write_atomic(&path, merged.values())?;

        log::debug!(
            "stored {symbol}/{timeframe}: {inserted} inserted, {replaced} replaced, {} total",
            merged.len()
        );

        Ok(WriteSummary {
            inserted,
            replaced,
            total: merged.len(),
        })
    }

    fn write_atomic<'a>(
        &self,
        path: &Path,
        candles: impl Iterator<Item = &'a Candle>,
    ) -> Result<(), StoreError> {
        let tmp_path = path.with_extension("csv.tmp");
        let result = self.write_rows(&tmp_path, candles).and_then(|()| {
            fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn write_rows<'a>(
        &self,
        path: &Path,
        candles: impl Iterator<Item = &'a Candle>,
    ) -> Result<(), StoreError> {
        let file = fs::File::create(path).map_err(|e| StoreError::io(path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);
        for c in candles {
            writer
                .serialize(CandleRow {
                    timestamp_utc: fmt_utc(c.timestamp_utc),
                    timestamp_local: c
                        .timestamp_local(self.timezone)
                        .format("%Y-%m-%dT%H:%M:%S%:z")
                        .to_string(),
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                    volume: c.volume,
                    source: c.source.as_str(),
                    last_updated_utc: fmt_utc(c.last_updated_utc),
                })
                .map_err(|e| StoreError::csv(path, e))?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::io(path, e.into_error()))?;
        file.sync_all().map_err(|e| StoreError::io(path, e))?;
        Ok(())
    }

    /// Missing ranges in the stored series, for targeted re-fetch.
    pub fn detect_gaps(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        expected_interval: Duration,
    ) -> Result<Vec<GapRange>, StoreError> {
        let (candles, _) = self.read(symbol, timeframe)?;
        let timestamps: Vec<DateTime<Utc>> = candles.iter().map(|c| c.timestamp_utc).collect();
        Ok(find_gaps(&timestamps, expected_interval, self.gap_tolerance))
    }

    /// Every stored `(symbol, timeframe)`, sorted.
    pub fn keys(&self) -> Result<Vec<(String, Timeframe)>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(symbol) = name.strip_prefix("symbol=") else {
                continue;
            };
            let dir = entry.path();
            let files = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
            for file in files {
                let file = file.map_err(|e| StoreError::io(&dir, e))?;
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                    continue;
                }
                if let Some(tf) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<Timeframe>().ok())
                {
                    keys.push((symbol.to_string(), tf));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn status(&self, symbol: &str, timeframe: Timeframe) -> Result<KeyStatus, StoreError> {
        let (candles, last) = self.read(symbol, timeframe)?;
        Ok(KeyStatus {
            symbol: symbol.to_string(),
            timeframe,
            candle_count: candles.len(),
            first: candles.first().map(|c| c.timestamp_utc),
            last,
        })
    }
}

/// Millisecond precision: HTTP sources deliver millisecond timestamps.
fn fmt_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_utc(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, name: &str) -> Result<&'r str, String> {
    record
        .get(idx)
        .ok_or_else(|| format!("missing field '{name}'"))
}

fn parse_number(raw: &str, column: &str) -> Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| format!("{column} is not numeric: '{raw}'"))
}

/// Read and validate a candle file. Any bad row fails the whole read.
fn read_candle_file(
    path: &Path,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Vec<Candle>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| StoreError::csv(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| StoreError::csv(path, e))?
        .clone();
    let column_index = |name: &str| -> Result<usize, StoreError> {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            DataIntegrityError::new(symbol, timeframe, "header", format!("missing column '{name}'"))
                .into()
        })
    };
    let idx_ts = column_index("timestamp_utc")?;
    let idx_open = column_index("open")?;
    let idx_high = column_index("high")?;
    let idx_low = column_index("low")?;
    let idx_close = column_index("close")?;
    let idx_volume = column_index("volume")?;
    let idx_source = column_index("source")?;
    let idx_updated = column_index("last_updated_utc")?;

    let mut candles: Vec<Candle> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let location = format!("row {row}");
        let integrity = |reason: String| -> StoreError {
            DataIntegrityError::new(symbol, timeframe, location.clone(), reason).into()
        };
        let record = record.map_err(|e| integrity(format!("unreadable row: {e}")))?;
        let parse_row = || -> Result<Candle, String> {
            Ok(Candle {
                symbol: symbol.to_string(),
                timeframe,
                timestamp_utc: parse_utc(field(&record, idx_ts, "timestamp_utc")?)?,
                open: parse_number(field(&record, idx_open, "open")?, "open")?,
                high: parse_number(field(&record, idx_high, "high")?, "high")?,
                low: parse_number(field(&record, idx_low, "low")?, "low")?,
                close: parse_number(field(&record, idx_close, "close")?, "close")?,
                volume: parse_number(field(&record, idx_volume, "volume")?, "volume")?,
                source: field(&record, idx_source, "source")?.parse::<CandleOrigin>()?,
                last_updated_utc: parse_utc(field(&record, idx_updated, "last_updated_utc")?)?,
            })
        };
        let candle = parse_row().map_err(&integrity)?;
        candle.validate().map_err(&integrity)?;

        if let Some(prev) = candles.last() {
            if candle.timestamp_utc <= prev.timestamp_utc {
                return Err(integrity(format!(
                    "timestamp {} is not after previous row {}",
                    fmt_utc(candle.timestamp_utc),
                    fmt_utc(prev.timestamp_utc)
                )));
            }
        }
        candles.push(candle);
    }
    Ok(candles)
}
