//! Timestamp utilities.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Formats accepted for the submit/start column of scheduler listings.
const SCHEDULER_DATETIME_FORMATS: [&str; 2] = ["%m/%d/%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as ISO 8601 string.
///
/// # Examples
///
/// ```
/// use seqflow::utils::{format_iso8601, now_utc};
///
/// let ts = format_iso8601(&now_utc());
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Formats a wall-clock duration for progress logs, e.g. `1h 02m 03s`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Parses the submit/start time printed by Grid Engine listings.
///
/// Classic `qstat` prints `MM/DD/YYYY HH:MM:SS`; newer builds print ISO
/// 8601 without a zone. The scheduler's local time is kept as-is.
#[must_use]
pub fn parse_scheduler_datetime(input: &str) -> Option<NaiveDateTime> {
    let trimmed = input.trim();
    SCHEDULER_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_iso_timestamp_format() {
        let ts = format_iso8601(&now_utc());
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(7)), "7s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h 02m 03s");
    }

    #[test]
    fn test_parse_classic_qstat_datetime() {
        let dt = parse_scheduler_datetime("10/17/2026 09:05:30").unwrap();
        assert_eq!(dt.year(), 2026);
        assert_eq!(dt.month(), 10);
        assert_eq!(dt.day(), 17);
        assert_eq!(dt.minute(), 5);
    }

    #[test]
    fn test_parse_iso_qstat_datetime() {
        let dt = parse_scheduler_datetime("2026-10-17T09:05:30.123").unwrap();
        assert_eq!(dt.hour(), 9);
    }

    #[test]
    fn test_parse_garbage_datetime() {
        assert!(parse_scheduler_datetime("yesterday").is_none());
        assert!(parse_scheduler_datetime("").is_none());
    }
}
