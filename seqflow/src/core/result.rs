//! Outcome of one stage invocation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::{JobGroup, JobHandle};
use crate::utils::{now_utc, Timestamp};

/// A unit that was not submitted because its outputs already exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUnit {
    /// The unit label.
    pub unit: String,
    /// The outputs that were found.
    pub outputs: Vec<PathBuf>,
}

/// A unit the scheduler refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedUnit {
    /// The unit label.
    pub unit: String,
    /// The rejection message.
    pub reason: String,
}

/// Result of running one batch stage.
///
/// Lives only for the duration of the run; the sequencer uses it to drive
/// output verification and then cleanup. Only `transient` is ever removed:
/// the intermediates of rejected units and of units with missing outputs
/// are moved to `kept` so a rerun can retry them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage name.
    pub stage: String,
    /// The job group, if any job had to be submitted.
    pub group: Option<JobGroup>,
    /// Handles of the submitted jobs.
    pub submitted: Vec<JobHandle>,
    /// Units skipped because their outputs exist.
    pub skipped: Vec<SkippedUnit>,
    /// Units rejected at submission.
    pub rejected: Vec<RejectedUnit>,
    /// Transient paths of units that are finished, safe to remove.
    pub transient: Vec<PathBuf>,
    /// Transient paths of rejected or incomplete units, never removed.
    pub kept: Vec<PathBuf>,
    /// Labels of submitted units whose outputs are absent after the barrier.
    pub missing: Vec<String>,
    /// When the barrier released.
    pub completed_at: Timestamp,
}

impl StageResult {
    /// Creates an empty result for a stage invocation.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            group: None,
            submitted: Vec::new(),
            skipped: Vec::new(),
            rejected: Vec::new(),
            transient: Vec::new(),
            kept: Vec::new(),
            missing: Vec::new(),
            completed_at: now_utc(),
        }
    }

    /// Sets the job group.
    #[must_use]
    pub fn with_group(mut self, group: JobGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Returns the number of units the stage saw.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.submitted.len() + self.skipped.len() + self.rejected.len()
    }

    /// Returns true if nothing was rejected and no outputs are missing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.missing.is_empty()
    }

    /// Short JSON summary used in events.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "stage": self.stage,
            "group": self.group.as_ref().map(JobGroup::as_str),
            "submitted": self.submitted.len(),
            "skipped": self.skipped.len(),
            "rejected": self.rejected.len(),
            "missing": self.missing.len(),
            "kept": self.kept.len(),
            "completed_at": crate::utils::format_iso8601(&self.completed_at),
        })
    }
}
