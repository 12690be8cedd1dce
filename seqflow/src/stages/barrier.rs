//! Completion barrier: poll a job group until it drains.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::core::JobGroup;
use crate::errors::BarrierError;
use crate::scheduler::{PollStatus, SchedulerClient};
use crate::utils::format_elapsed;

/// How the delay between polls grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = interval
    #[default]
    Constant,
    /// delay = interval * (poll + 1)
    Linear,
    /// delay = interval * 2^poll
    Exponential,
}

/// Polling behaviour of the completion barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Base delay between polls in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Delay cap in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Give up after this many polls.
    #[serde(default)]
    pub max_polls: Option<u64>,
    /// Consecutive failed polls tolerated before giving up.
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_max_interval_ms() -> u64 {
    300_000
}

fn default_max_poll_errors() -> u32 {
    5
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            backoff: BackoffStrategy::Constant,
            max_interval_ms: default_max_interval_ms(),
            max_polls: None,
            max_poll_errors: default_max_poll_errors(),
        }
    }
}

impl PollPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_interval(mut self, max: Duration) -> Self {
        self.max_interval_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the poll budget.
    #[must_use]
    pub fn with_max_polls(mut self, polls: u64) -> Self {
        self.max_polls = Some(polls);
        self
    }

    /// Sets the tolerated consecutive poll failures.
    #[must_use]
    pub fn with_max_poll_errors(mut self, errors: u32) -> Self {
        self.max_poll_errors = errors;
        self
    }

    /// Returns the base interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns the delay after the given poll (0-based).
    #[must_use]
    pub fn delay_for(&self, poll: u64) -> Duration {
        let base = self.interval_ms;
        let max = self.max_interval_ms.max(base);

        let delay = match self.backoff {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(poll.saturating_add(1)),
            BackoffStrategy::Exponential => {
                let exp = u32::try_from(poll).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exp))
            }
        };

        Duration::from_millis(delay.min(max))
    }
}

/// How a barrier wait went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierOutcome {
    /// Number of polls made, including the final one.
    pub polls: u64,
    /// Time spent waiting.
    pub elapsed: Duration,
}

/// Blocks until every job of a group has left the scheduler.
///
/// The barrier asserts that all jobs reached a terminal state, not that
/// they succeeded; outputs are checked separately.
pub struct CompletionBarrier<'a> {
    scheduler: &'a dyn SchedulerClient,
    policy: PollPolicy,
}

impl<'a> CompletionBarrier<'a> {
    /// Creates a barrier over a scheduler.
    #[must_use]
    pub fn new(scheduler: &'a dyn SchedulerClient, policy: PollPolicy) -> Self {
        Self { scheduler, policy }
    }

    /// Polls `group` until it drains.
    ///
    /// # Errors
    ///
    /// Returns `BarrierError::Cancelled` if the token fires,
    /// `PollBudgetExhausted` if the poll budget runs out and `Scheduler`
    /// after too many consecutive failed polls.
    pub async fn wait(&self, group: &JobGroup, cancel: &CancellationToken) -> Result<BarrierOutcome, BarrierError> {
        let started = Instant::now();
        let mut polls: u64 = 0;
        let mut errors: u32 = 0;

        info!(group = %group, "Waiting for job group");

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(group, cancel));
            }

            polls += 1;
            match self.scheduler.poll(group).await {
                Ok(PollStatus::Done) => {
                    let elapsed = started.elapsed();
                    info!(group = %group, polls, elapsed = %format_elapsed(elapsed), "Job group finished");
                    return Ok(BarrierOutcome { polls, elapsed });
                }
                Ok(PollStatus::Pending(pending)) => {
                    errors = 0;
                    debug!(group = %group, pending, poll = polls, "Job group still pending");
                }
                Err(source) => {
                    errors += 1;
                    if errors > self.policy.max_poll_errors {
                        return Err(BarrierError::Scheduler {
                            group: group.to_string(),
                            source,
                        });
                    }
                    warn!(group = %group, error = %source, errors, "Poll failed");
                }
            }

            if self.policy.max_polls.is_some_and(|max| polls >= max) {
                return Err(BarrierError::PollBudgetExhausted {
                    group: group.to_string(),
                    polls,
                });
            }

            let delay = self.policy.delay_for(polls - 1);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(cancelled(group, cancel)),
            }
        }
    }
}

fn cancelled(group: &JobGroup, cancel: &CancellationToken) -> BarrierError {
    BarrierError::Cancelled {
        group: group.to_string(),
        reason: cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SchedulerError;
    use crate::scheduler::MockSchedulerClient;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn fast() -> PollPolicy {
        PollPolicy::new().with_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_delay_strategies() {
        let policy = PollPolicy::new()
            .with_interval(Duration::from_secs(10))
            .with_max_interval(Duration::from_secs(60));
        assert_eq!(policy.delay_for(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));

        let linear = policy.clone().with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for(0), Duration::from_secs(10));
        assert_eq!(linear.delay_for(2), Duration::from_secs(30));
        assert_eq!(linear.delay_for(20), Duration::from_secs(60));

        let exponential = policy.with_backoff(BackoffStrategy::Exponential);
        assert_eq!(exponential.delay_for(1), Duration::from_secs(20));
        assert_eq!(exponential.delay_for(2), Duration::from_secs(40));
        assert_eq!(exponential.delay_for(64), Duration::from_secs(60));
    }

    #[test]
    fn test_default_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval(), Duration::from_secs(60));
        assert_eq!(policy.max_polls, None);
        assert_eq!(policy.max_poll_errors, 5);
    }

    #[tokio::test]
    async fn test_wait_returns_after_group_drains() {
        let polls = Arc::new(AtomicU64::new(0));
        let counter = polls.clone();

        let mut scheduler = MockSchedulerClient::new();
        scheduler.expect_poll().times(3).returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(if n < 2 { PollStatus::Pending(2 - n as usize) } else { PollStatus::Done })
        });

        let barrier = CompletionBarrier::new(&scheduler, fast());
        let outcome = barrier
            .wait(&JobGroup::new("hisat2_1"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.polls, 3);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_budget_exhausted() {
        let mut scheduler = MockSchedulerClient::new();
        scheduler
            .expect_poll()
            .times(4)
            .returning(|_| Ok(PollStatus::Pending(1)));

        let barrier = CompletionBarrier::new(&scheduler, fast().with_max_polls(4));
        let err = barrier
            .wait(&JobGroup::new("g"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BarrierError::PollBudgetExhausted { polls: 4, .. }));
    }

    #[tokio::test]
    async fn test_transient_poll_errors_are_tolerated() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();

        let mut scheduler = MockSchedulerClient::new();
        scheduler.expect_poll().returning(move |_| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(SchedulerError::Query {
                    command: "qstat".to_string(),
                    reason: "timeout".to_string(),
                }),
                _ => Ok(PollStatus::Done),
            }
        });

        let barrier = CompletionBarrier::new(&scheduler, fast().with_max_poll_errors(2));
        let outcome = barrier
            .wait(&JobGroup::new("g"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.polls, 3);
    }

    #[tokio::test]
    async fn test_poll_error_budget_exceeded() {
        let mut scheduler = MockSchedulerClient::new();
        scheduler.expect_poll().times(2).returning(|_| {
            Err(SchedulerError::Query {
                command: "qstat".to_string(),
                reason: "no route to host".to_string(),
            })
        });

        let barrier = CompletionBarrier::new(&scheduler, fast().with_max_poll_errors(1));
        let err = barrier
            .wait(&JobGroup::new("g"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BarrierError::Scheduler { .. }));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let mut scheduler = MockSchedulerClient::new();
        scheduler.expect_poll().returning(|_| Ok(PollStatus::Pending(1)));

        let token = Arc::new(CancellationToken::new());
        let trigger = Arc::clone(&token);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel("interrupted");
        });

        let policy = PollPolicy::new().with_interval(Duration::from_secs(3600));
        let barrier = CompletionBarrier::new(&scheduler, policy);
        let err = barrier.wait(&JobGroup::new("g"), &token).await.unwrap_err();

        match err {
            BarrierError::Cancelled { reason, .. } => assert_eq!(reason, "interrupted"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_poll() {
        let scheduler = MockSchedulerClient::new();
        let token = CancellationToken::new();
        token.cancel("shutdown");

        let barrier = CompletionBarrier::new(&scheduler, fast());
        let err = barrier.wait(&JobGroup::new("g"), &token).await.unwrap_err();
        assert!(matches!(err, BarrierError::Cancelled { .. }));
    }
}
