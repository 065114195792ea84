//! Gap detection over sorted candle timestamps.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range of missing candle timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapRange {
    /// First missing bar.
    pub start: DateTime<Utc>,
    /// Last missing bar.
    pub end: DateTime<Utc>,
}

impl GapRange {
    /// Exclusive upper bound for a `[start, end)` fetch covering the gap.
    pub fn end_exclusive(&self, interval: Duration) -> DateTime<Utc> {
        self.end + interval
    }

    /// Number of bars missing, assuming the gap is aligned to `interval`.
    pub fn missing_bars(&self, interval: Duration) -> i64 {
        let step = interval.num_milliseconds();
        if step <= 0 {
            return 0;
        }
        (self.end - self.start).num_milliseconds() / step + 1
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

impl fmt::Display for GapRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ..= {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Flag every consecutive delta exceeding `interval × tolerance`.
///
/// `timestamps` must be sorted ascending. A flagged delta that does not hold
/// a whole missing bar (misaligned data) yields no range.
pub fn find_gaps(timestamps: &[DateTime<Utc>], interval: Duration, tolerance: f64) -> Vec<GapRange> {
    let step_ms = interval.num_milliseconds() as f64;
    if step_ms <= 0.0 {
        return Vec::new();
    }
    let threshold_ms = step_ms * tolerance.max(1.0);

    timestamps
        .windows(2)
        .filter_map(|w| {
            let delta_ms = (w[1] - w[0]).num_milliseconds() as f64;
            if delta_ms <= threshold_ms {
                return None;
            }
            let start = w[0] + interval;
            let end = w[1] - interval;
            (start <= end).then_some(GapRange { start, end })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minutes(offsets: &[i64]) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        offsets.iter().map(|m| base + Duration::minutes(*m)).collect()
    }

    #[test]
    fn contiguous_series_has_no_gaps() {
        let ts = minutes(&[0, 1, 2, 3, 4]);
        assert!(find_gaps(&ts, Duration::minutes(1), 1.5).is_empty());
    }

    #[test]
    fn single_missing_range_is_reported_exactly() {
        let ts = minutes(&[0, 1, 2, 6, 7]);
        let gaps = find_gaps(&ts, Duration::minutes(1), 1.5);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start, minutes(&[3])[0]);
        assert_eq!(gaps[0].end, minutes(&[5])[0]);
        assert_eq!(gaps[0].missing_bars(Duration::minutes(1)), 3);
    }

    #[test]
    fn tolerance_suppresses_small_gaps() {
        let ts = minutes(&[0, 2, 4]);
        assert!(find_gaps(&ts, Duration::minutes(1), 2.5).is_empty());
        assert_eq!(find_gaps(&ts, Duration::minutes(1), 1.5).len(), 2);
    }

    #[test]
    fn misaligned_delta_yields_no_range() {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        let ts = vec![base, base + Duration::seconds(100)];
        assert!(find_gaps(&ts, Duration::minutes(1), 1.5).is_empty());
    }
}
