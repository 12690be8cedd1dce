//! Batch scheduler access.
//!
//! The engine needs two things from a scheduler: accept a job, and say
//! whether any job of a group is still queued or running. The
//! [`SchedulerClient`] trait is that contract; [`GridEngineClient`] speaks
//! it to Sun/Open Grid Engine through `qsub` and `qstat`.

mod grid_engine;
mod listing;
mod script;

pub use grid_engine::GridEngineClient;
pub use listing::{count_pending, parse_listing, ListingEntry};
pub use script::{job_group_name, render_script, required_bindings, ScriptSet, StageTemplate};

use async_trait::async_trait;
use std::fmt;

use crate::core::{JobGroup, JobHandle, JobSpec};
use crate::errors::{SchedulerError, SubmissionError};

/// Completion state of a job group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// This many jobs are still queued or running.
    Pending(usize),
    /// No job of the group is left.
    Done,
}

impl PollStatus {
    /// Builds a status from a pending count.
    #[must_use]
    pub fn from_pending(pending: usize) -> Self {
        if pending == 0 {
            Self::Done
        } else {
            Self::Pending(pending)
        }
    }

    /// Returns true if the group drained.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(n) => write!(f, "{n} pending"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Submits jobs and reports job group completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Submits one job.
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, SubmissionError>;

    /// Reports whether jobs of the group are still queued or running.
    async fn poll(&self, group: &JobGroup) -> Result<PollStatus, SchedulerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_status_from_pending() {
        assert_eq!(PollStatus::from_pending(0), PollStatus::Done);
        assert_eq!(PollStatus::from_pending(3), PollStatus::Pending(3));
        assert!(PollStatus::Done.is_done());
        assert_eq!(PollStatus::Pending(2).to_string(), "2 pending");
    }
}
