//! Post-stage output verification.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::StageResult;
use crate::errors::{MissingOutputsError, SeqflowError};
use crate::events::{names, EventSink};

/// What to do when a stage saw no units or left outputs missing.
///
/// Failed jobs are invisible to the barrier, which only waits for jobs to
/// leave the queue; missing outputs are the only trace they leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    /// Say nothing.
    Ignore,
    /// Log a warning and carry on.
    #[default]
    Warn,
    /// Stop the pipeline.
    Abort,
}

impl VerifyPolicy {
    /// Applies the policy to a finished stage.
    ///
    /// Units the scheduler rejected count as missing: they will never
    /// produce their outputs.
    ///
    /// # Errors
    ///
    /// Under [`VerifyPolicy::Abort`], returns an error if the stage saw no
    /// units or any unit lacks its outputs.
    pub fn apply(self, result: &StageResult, events: &dyn EventSink) -> Result<(), SeqflowError> {
        if self == Self::Ignore {
            return Ok(());
        }

        if result.unit_count() == 0 {
            if self == Self::Abort {
                return Err(SeqflowError::stage(&result.stage, "no work units"));
            }
            warn!(stage = %result.stage, "Stage found no work units");
            return Ok(());
        }

        let missing: Vec<String> = result
            .rejected
            .iter()
            .map(|r| r.unit.clone())
            .chain(result.missing.iter().cloned())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        events.emit(
            names::OUTPUTS_MISSING,
            Some(serde_json::json!({"stage": result.stage, "units": missing})),
        );

        if self == Self::Abort {
            return Err(MissingOutputsError::new(&result.stage, missing).into());
        }
        warn!(
            stage = %result.stage,
            count = missing.len(),
            units = ?missing,
            "Units finished without their outputs"
        );
        Ok(())
    }
}
