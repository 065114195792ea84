//! Local-time trading windows.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open local time window `[start, end)`.
///
/// `start > end` wraps past midnight (`22:00..02:00`). `start == end` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build from `"HH:MM"` or `"HH:MM:SS"` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, String> {
        Ok(Self {
            start: hhmm::parse(start)?,
            end: hhmm::parse(end)?,
        })
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// `"HH:MM"` serde representation for `NaiveTime`; seconds are accepted on input.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|_| format!("invalid time of day '{raw}', expected HH:MM"))
    }

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        let text = if t.format("%S").to_string() == "00" {
            t.format("%H:%M").to_string()
        } else {
            t.format("%H:%M:%S").to_string()
        };
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn half_open_bounds() {
        let w = TimeWindow::parse("09:30", "15:45").unwrap();
        assert!(w.contains(hm(9, 30)));
        assert!(w.contains(hm(15, 44)));
        assert!(!w.contains(hm(15, 45)));
        assert!(!w.contains(hm(9, 29)));
    }

    #[test]
    fn wrapping_window() {
        let w = TimeWindow::parse("22:00", "02:00").unwrap();
        assert!(w.wraps_midnight());
        assert!(w.contains(hm(23, 0)));
        assert!(w.contains(hm(0, 0)));
        assert!(w.contains(hm(1, 59)));
        assert!(!w.contains(hm(2, 0)));
        assert!(!w.contains(hm(12, 0)));
    }

    #[test]
    fn empty_window_contains_nothing() {
        let w = TimeWindow::parse("10:00", "10:00").unwrap();
        assert!(w.is_empty());
        assert!(!w.contains(hm(10, 0)));
    }

    #[test]
    fn serializes_as_hhmm() {
        let w = TimeWindow::parse("09:30", "15:45:30").unwrap();
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"start":"09:30","end":"15:45:30"}"#);
        let back: TimeWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn rejects_garbage() {
        assert!(TimeWindow::parse("9h30", "10:00").is_err());
    }
}
