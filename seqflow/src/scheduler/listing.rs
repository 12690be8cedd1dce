//! Parser for `qstat -r` listings.
//!
//! A listing looks like:
//!
//! ```text
//! job-ID  prior   name       user   state submit/start at     queue        slots ja-task-ID
//! -----------------------------------------------------------------------------------------
//!  812345 0.55500 trimmomati jdoe   r     03/14/2024 10:01:02 all.q@node01     1
//!        Full jobname:     trimmomatic_4821
//!        Master Queue:     all.q@node01
//! ```
//!
//! The name column is truncated, so matching uses the `Full jobname:` line
//! that `-r` adds under each job.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::utils::parse_scheduler_datetime;

/// One job from a status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Scheduler job id.
    pub id: String,
    /// Possibly truncated job name.
    pub name: String,
    /// Job owner.
    pub owner: String,
    /// State letters (`qw`, `r`, `Eqw`, ...).
    pub state: String,
    /// Submission or start time.
    pub submitted: Option<NaiveDateTime>,
    /// Untruncated job name from the `-r` detail lines.
    pub full_name: Option<String>,
}

impl ListingEntry {
    /// Returns the full job name, falling back to the listed one.
    #[must_use]
    pub fn job_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.name)
    }

    /// Returns false for error states, which never leave the queue on
    /// their own.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.state.contains('E')
    }
}

/// Parses a `qstat -r` listing.
///
/// Header, separator and unknown detail lines are skipped.
#[must_use]
pub fn parse_listing(listing: &str) -> Vec<ListingEntry> {
    let mut entries: Vec<ListingEntry> = Vec::new();

    for line in listing.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("Full jobname:") {
            if let Some(last) = entries.last_mut() {
                last.full_name = Some(rest.trim().to_string());
            }
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 5 || !fields[0].chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        let submitted = match (fields.get(5), fields.get(6)) {
            (Some(date), Some(time)) => parse_scheduler_datetime(&format!("{date} {time}")),
            _ => None,
        };

        entries.push(ListingEntry {
            id: fields[0].to_string(),
            name: fields[2].to_string(),
            owner: fields[3].to_string(),
            state: fields[4].to_string(),
            submitted,
            full_name: None,
        });
    }

    entries
}

/// Counts active jobs of `group`, optionally restricted to one owner.
#[must_use]
pub fn count_pending(entries: &[ListingEntry], group: &str, owner: Option<&str>) -> usize {
    entries
        .iter()
        .filter(|e| e.job_name() == group)
        .filter(|e| owner.map_or(true, |o| e.owner == o))
        .filter(|e| e.is_active())
        .count()
}
