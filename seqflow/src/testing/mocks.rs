//! In-memory scheduler for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;

use crate::core::{JobGroup, JobHandle, JobSpec};
use crate::errors::{SchedulerError, SubmissionError};
use crate::scheduler::{PollStatus, SchedulerClient};

/// A scheduler that accepts jobs in memory.
///
/// Each job group reports as pending for a configurable number of polls.
/// Optionally the declared outputs of every accepted job are created on
/// submission, as if the job had already run.
#[derive(Debug, Default)]
pub struct MockScheduler {
    next_id: Mutex<u64>,
    submitted: Mutex<Vec<JobSpec>>,
    rejected_units: Mutex<HashSet<String>>,
    pending_polls: usize,
    polls: Mutex<HashMap<JobGroup, usize>>,
    create_outputs: bool,
}

impl MockScheduler {
    /// Creates a scheduler whose groups are done on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports each group as pending for `polls` polls.
    #[must_use]
    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Creates the declared outputs of accepted jobs.
    #[must_use]
    pub fn creating_outputs(mut self) -> Self {
        self.create_outputs = true;
        self
    }

    /// Rejects submissions for the given unit label.
    #[must_use]
    pub fn rejecting(self, unit: impl Into<String>) -> Self {
        self.rejected_units.lock().insert(unit.into());
        self
    }

    /// Returns every accepted job spec.
    #[must_use]
    pub fn submitted(&self) -> Vec<JobSpec> {
        self.submitted.lock().clone()
    }

    /// Returns the unit labels of accepted jobs, in submission order.
    #[must_use]
    pub fn submitted_units(&self) -> Vec<String> {
        self.submitted.lock().iter().map(|s| s.unit().to_string()).collect()
    }

    /// Returns the accepted jobs of one stage.
    #[must_use]
    pub fn submitted_for(&self, stage: &str) -> Vec<JobSpec> {
        self.submitted
            .lock()
            .iter()
            .filter(|s| s.stage() == stage)
            .cloned()
            .collect()
    }

    /// Returns the number of polls made for a group.
    #[must_use]
    pub fn poll_count(&self, group: &JobGroup) -> usize {
        self.polls.lock().get(group).copied().unwrap_or(0)
    }

    /// Returns the total number of polls made.
    #[must_use]
    pub fn total_polls(&self) -> usize {
        self.polls.lock().values().sum()
    }
}

#[async_trait]
impl SchedulerClient for MockScheduler {
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, SubmissionError> {
        if self.rejected_units.lock().contains(spec.unit()) {
            return Err(SubmissionError::Rejected {
                unit: spec.unit().to_string(),
                reason: "Unable to run job: queue is disabled".to_string(),
            });
        }

        if self.create_outputs {
            for output in spec.outputs() {
                if let Some(parent) = output.parent() {
                    let _ = fs::create_dir_all(parent);
                }
                let _ = fs::write(output, b"");
            }
        }

        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        self.submitted.lock().push(spec.clone());
        Ok(JobHandle::new(id.to_string(), spec.group().clone(), spec.unit()))
    }

    async fn poll(&self, group: &JobGroup) -> Result<PollStatus, SchedulerError> {
        let mut polls = self.polls.lock();
        let count = polls.entry(group.clone()).or_insert(0);
        *count += 1;

        if *count > self.pending_polls {
            return Ok(PollStatus::Done);
        }
        let jobs = self
            .submitted
            .lock()
            .iter()
            .filter(|s| s.group() == group)
            .count();
        Ok(PollStatus::from_pending(jobs.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TemplateRef;
    use std::path::PathBuf;

    fn spec(unit: &str) -> JobSpec {
        JobSpec::builder(
            "trim_fastq",
            JobGroup::new("trimmomatic_4"),
            TemplateRef::new("single", "/scratch/trimmomatic_se_4.sh", vec![]),
        )
        .unit(unit)
        .output(PathBuf::from(format!("/nonexistent/{unit}.fq.gz")))
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_assigns_ids() {
        let scheduler = MockScheduler::new();

        let first = scheduler.submit(&spec("zma:A")).await.unwrap();
        let second = scheduler.submit(&spec("zma:B")).await.unwrap();

        assert_eq!(first.id, "1");
        assert_eq!(second.id, "2");
        assert_eq!(scheduler.submitted_units(), vec!["zma:A", "zma:B"]);
    }

    #[tokio::test]
    async fn test_rejecting_unit() {
        let scheduler = MockScheduler::new().rejecting("zma:B");

        assert!(scheduler.submit(&spec("zma:A")).await.is_ok());
        let err = scheduler.submit(&spec("zma:B")).await.unwrap_err();
        assert_eq!(err.unit(), "zma:B");
        assert_eq!(scheduler.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_polls() {
        let scheduler = MockScheduler::new().with_pending_polls(2);
        scheduler.submit(&spec("zma:A")).await.unwrap();
        let group = JobGroup::new("trimmomatic_4");

        assert_eq!(scheduler.poll(&group).await.unwrap(), PollStatus::Pending(1));
        assert_eq!(scheduler.poll(&group).await.unwrap(), PollStatus::Pending(1));
        assert_eq!(scheduler.poll(&group).await.unwrap(), PollStatus::Done);
        assert_eq!(scheduler.poll_count(&group), 3);
    }
}
