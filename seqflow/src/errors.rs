//! Error types for the seqflow engine.
//!
//! Each concern owns a small error enum; [`SeqflowError`] unifies them for
//! the pipeline sequencer and the command line driver.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::StageState;

/// The main error type for seqflow operations.
#[derive(Debug, Error)]
pub enum SeqflowError {
    /// The configuration or dataset failed its sanity checks.
    #[error("Configuration error: {}", problems.join("; "))]
    Configuration {
        /// Every problem reported by the sanity collaborators.
        problems: Vec<String>,
    },

    /// A configuration file could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Work unit discovery failed.
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    /// A job plan could not be turned into a job spec.
    #[error("{0}")]
    JobSpec(#[from] JobSpecError),

    /// Submission script handling failed.
    #[error("{0}")]
    Script(#[from] ScriptError),

    /// The completion barrier did not complete.
    #[error("{0}")]
    Barrier(#[from] BarrierError),

    /// Declared outputs were missing after a stage and the policy aborts.
    #[error("{0}")]
    MissingOutputs(#[from] MissingOutputsError),

    /// Expression matrix handling failed.
    #[error("{0}")]
    Matrix(#[from] MatrixError),

    /// A stage was driven through an invalid lifecycle transition.
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// A stage failed for a stage-specific reason.
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        /// The stage name.
        stage: String,
        /// What went wrong.
        message: String,
    },

    /// The run was cancelled before a stage started.
    #[error("Stage '{stage}' not started: {reason}")]
    Cancelled {
        /// The stage that would have run next.
        stage: String,
        /// The cancellation reason.
        reason: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeqflowError {
    /// Creates a configuration error from a list of problems.
    #[must_use]
    pub fn configuration(problems: Vec<String>) -> Self {
        Self::Configuration { problems }
    }

    /// Creates a stage error.
    #[must_use]
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error means the pipeline never started.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Config(_))
    }

    /// Returns true if the run stopped because it was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled { .. } | Self::Barrier(BarrierError::Cancelled { .. })
        )
    }
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected schema.
    #[error("Cannot parse {}: {source}", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// Errors raised while discovering work units.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The input directory could not be listed.
    #[error("Cannot list {}: {source}", path.display())]
    Io {
        /// The directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while building a [`crate::core::JobSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobSpecError {
    /// A binding required by the submission template was not supplied.
    #[error("Template '{template}' requires binding '{key}'")]
    MissingBinding {
        /// The template variant.
        template: String,
        /// The missing key.
        key: String,
    },

    /// A binding key was supplied twice.
    #[error("Binding '{key}' supplied more than once")]
    DuplicateBinding {
        /// The duplicated key.
        key: String,
    },

    /// A binding cannot be passed to the scheduler.
    #[error("Invalid binding '{key}={value}': {reason}")]
    InvalidBinding {
        /// The key.
        key: String,
        /// The offending value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    /// The stage asked for a template variant it never declared.
    #[error("Stage '{stage}' has no template variant '{variant}'")]
    UnknownVariant {
        /// The stage name.
        stage: String,
        /// The requested variant.
        variant: String,
    },
}

/// Errors raised when the scheduler refuses a single unit.
///
/// Submission errors are per unit: they are recorded and the remaining
/// units of the stage are still submitted.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The scheduler ran but rejected the request.
    #[error("Scheduler rejected unit '{unit}': {reason}")]
    Rejected {
        /// The unit label.
        unit: String,
        /// Scheduler output explaining the rejection.
        reason: String,
    },

    /// The submission command could not be started at all.
    #[error("Cannot launch '{command}' for unit '{unit}': {source}")]
    Launch {
        /// The unit label.
        unit: String,
        /// The executable.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SubmissionError {
    /// Returns the label of the rejected unit.
    #[must_use]
    pub fn unit(&self) -> &str {
        match self {
            Self::Rejected { unit, .. } | Self::Launch { unit, .. } => unit,
        }
    }
}

/// Errors raised while querying the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The status command could not be started.
    #[error("Cannot launch '{command}': {source}")]
    Launch {
        /// The executable.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The status command ran but failed.
    #[error("Status query '{command}' failed: {reason}")]
    Query {
        /// The executable.
        command: String,
        /// Scheduler output explaining the failure.
        reason: String,
    },
}

/// Errors raised while waiting on a job group.
#[derive(Debug, Error)]
pub enum BarrierError {
    /// The wait was cancelled; submitted jobs keep running on the scheduler.
    #[error("Wait on job group '{group}' cancelled: {reason}")]
    Cancelled {
        /// The job group.
        group: String,
        /// The cancellation reason.
        reason: String,
    },

    /// The configured poll budget ran out before the group drained.
    #[error("Job group '{group}' still pending after {polls} polls")]
    PollBudgetExhausted {
        /// The job group.
        group: String,
        /// How many polls were made.
        polls: u64,
    },

    /// The scheduler could not be queried often enough.
    #[error("Job group '{group}' could not be polled: {source}")]
    Scheduler {
        /// The job group.
        group: String,
        /// The last scheduler error.
        #[source]
        source: SchedulerError,
    },
}

/// Errors raised while writing or removing submission scripts.
#[derive(Debug, Error)]
#[error("Submission script {}: {source}", path.display())]
pub struct ScriptError {
    /// The script path.
    pub path: PathBuf,
    /// The underlying IO error.
    #[source]
    pub source: std::io::Error,
}

/// Raised when declared outputs are absent after a stage and the verify
/// policy is set to abort.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' is missing outputs for {} unit(s): {}", units.len(), units.join(", "))]
pub struct MissingOutputsError {
    /// The stage name.
    pub stage: String,
    /// Labels of the units without outputs.
    pub units: Vec<String>,
}

impl MissingOutputsError {
    /// Creates a new missing outputs error.
    #[must_use]
    pub fn new(stage: impl Into<String>, units: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            units,
        }
    }
}

/// Errors raised while reading or writing expression matrices.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// The file could not be read or written.
    #[error("Matrix file {}: {source}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A line could not be parsed.
    #[error("{}:{line}: {message}", path.display())]
    Format {
        /// The file path.
        path: PathBuf,
        /// The 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },
}

/// Raised when a stage lifecycle transition is not allowed.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' cannot move from {from} to {to}")]
pub struct TransitionError {
    /// The stage name.
    pub stage: String,
    /// The current state.
    pub from: StageState,
    /// The requested state.
    pub to: StageState,
}
