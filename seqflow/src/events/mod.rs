//! Event sink system for pipeline observability.
//!
//! The sequencer and the stage runner report lifecycle events (stage state
//! changes, unit submissions and skips, quality warnings) through an
//! [`EventSink`]. The default sink forwards everything to `tracing`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the engine.
pub mod names {
    /// A stage was disabled and skipped.
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    /// All units of a stage were submitted.
    pub const STAGE_SUBMITTED: &str = "stage.submitted";
    /// The stage entered its completion barrier.
    pub const STAGE_AWAITING: &str = "stage.awaiting";
    /// Post-stage cleanup finished.
    pub const STAGE_CLEANED: &str = "stage.cleaned";
    /// The stage finished.
    pub const STAGE_DONE: &str = "stage.done";
    /// The stage failed hard.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A unit was skipped because its outputs exist.
    pub const UNIT_SKIPPED: &str = "unit.skipped";
    /// A unit was handed to the scheduler.
    pub const UNIT_SUBMITTED: &str = "unit.submitted";
    /// The scheduler rejected a unit.
    pub const UNIT_REJECTED: &str = "unit.rejected";
    /// Declared outputs were missing after the barrier.
    pub const OUTPUTS_MISSING: &str = "outputs.missing";
    /// A sample failed a quality cutoff.
    pub const QUALITY_WARNING: &str = "quality.warning";
}
