//! Small shared helpers for timestamps and durations.

pub mod timestamps;

pub use timestamps::{format_elapsed, format_iso8601, now_utc, parse_scheduler_datetime, Timestamp};
