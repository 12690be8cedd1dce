//! Stage lifecycle state and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a pipeline step gets its work done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// One scheduler job per work unit, joined by a completion barrier.
    #[default]
    Batch,
    /// Runs inside the orchestration process (matrix assembly, quality checks).
    Local,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch => write!(f, "batch"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// The lifecycle state of one stage within a pipeline run.
///
/// Batch stages move `NotRun -> Submitted -> AwaitingCompletion -> Cleaned -> Done`.
/// Local steps move straight from `NotRun` to `Done`. Any non-terminal
/// state may fall to `Failed`; only `NotRun` may become `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// The stage has not started.
    #[default]
    NotRun,
    /// Every unit was submitted (or skipped).
    Submitted,
    /// Blocking on the job group barrier.
    AwaitingCompletion,
    /// Post-stage cleanup ran.
    Cleaned,
    /// The stage finished.
    Done,
    /// The stage was disabled for this run.
    Skipped,
    /// The stage hit a hard error.
    Failed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRun => write!(f, "not_run"),
            Self::Submitted => write!(f, "submitted"),
            Self::AwaitingCompletion => write!(f, "awaiting_completion"),
            Self::Cleaned => write!(f, "cleaned"),
            Self::Done => write!(f, "done"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageState {
    /// Returns true if the state represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }

    /// Returns true if the stage finished without a hard error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped)
    }

    /// Returns true if `next` is a legal successor for a stage of `kind`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self, kind: StageKind) -> bool {
        if next == Self::Failed {
            return !self.is_terminal();
        }
        match (kind, self, next) {
            (_, Self::NotRun, Self::Skipped)
            | (StageKind::Batch, Self::NotRun, Self::Submitted)
            | (StageKind::Batch, Self::Submitted, Self::AwaitingCompletion)
            | (StageKind::Batch, Self::AwaitingCompletion, Self::Cleaned)
            | (StageKind::Batch, Self::Cleaned, Self::Done)
            | (StageKind::Local, Self::NotRun, Self::Done) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_state_display() {
        assert_eq!(StageState::NotRun.to_string(), "not_run");
        assert_eq!(StageState::AwaitingCompletion.to_string(), "awaiting_completion");
        assert_eq!(StageState::Done.to_string(), "done");
    }

    #[test]
    fn test_batch_lifecycle() {
        let path = [
            StageState::NotRun,
            StageState::Submitted,
            StageState::AwaitingCompletion,
            StageState::Cleaned,
            StageState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1], StageKind::Batch), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!StageState::NotRun.can_transition_to(StageState::Done, StageKind::Batch));
        assert!(!StageState::Submitted.can_transition_to(StageState::Cleaned, StageKind::Batch));
    }

    #[test]
    fn test_local_lifecycle() {
        assert!(StageState::NotRun.can_transition_to(StageState::Done, StageKind::Local));
        assert!(!StageState::NotRun.can_transition_to(StageState::Submitted, StageKind::Local));
    }

    #[test]
    fn test_failed_and_skipped() {
        assert!(StageState::AwaitingCompletion.can_transition_to(StageState::Failed, StageKind::Batch));
        assert!(!StageState::Done.can_transition_to(StageState::Failed, StageKind::Batch));
        assert!(StageState::NotRun.can_transition_to(StageState::Skipped, StageKind::Local));
        assert!(!StageState::Submitted.can_transition_to(StageState::Skipped, StageKind::Batch));
    }

    #[test]
    fn test_stage_state_is_terminal() {
        assert!(StageState::Done.is_terminal());
        assert!(StageState::Skipped.is_terminal());
        assert!(StageState::Failed.is_terminal());
        assert!(!StageState::Cleaned.is_terminal());
        assert!(StageState::Skipped.is_success());
        assert!(!StageState::Failed.is_success());
    }

    #[test]
    fn test_stage_state_serialize() {
        let json = serde_json::to_string(&StageState::AwaitingCompletion).unwrap();
        assert_eq!(json, r#""awaiting_completion""#);

        let deserialized: StageState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageState::AwaitingCompletion);
    }
}
