//! Submission and completion of one batch stage.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{configured_templates, BindingValue, CompletionBarrier, JobPlan, PollPolicy, StageDefinition};
use crate::cancellation::CancellationToken;
use crate::config::{DataLayout, PipelineConfig, StageSettings};
use crate::core::{JobSpec, RejectedUnit, SkippedUnit, StageResult, WorkUnit};
use crate::errors::{JobSpecError, SeqflowError};
use crate::events::{names, EventSink};
use crate::scheduler::{SchedulerClient, ScriptSet};
use crate::utils::now_utc;

/// A stage whose jobs have been handed to the scheduler.
#[derive(Debug)]
pub struct SubmittedStage {
    result: StageResult,
    scripts: Option<ScriptSet>,
    outputs: Vec<(String, JobPlan)>,
    policy: PollPolicy,
}

impl SubmittedStage {
    /// Returns the partial result: submitted, skipped and rejected units.
    #[must_use]
    pub fn result(&self) -> &StageResult {
        &self.result
    }

    /// Returns the number of submitted jobs.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.result.submitted.len()
    }
}

/// Runs batch stages against a scheduler.
#[derive(Clone)]
pub struct StageRunner {
    scheduler: Arc<dyn SchedulerClient>,
    config: Arc<PipelineConfig>,
    layout: Arc<DataLayout>,
    events: Arc<dyn EventSink>,
}

impl StageRunner {
    /// Creates a runner.
    pub fn new(
        scheduler: Arc<dyn SchedulerClient>,
        config: Arc<PipelineConfig>,
        layout: Arc<DataLayout>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            scheduler,
            config,
            layout,
            events,
        }
    }

    /// Submits, waits and verifies one stage.
    ///
    /// # Errors
    ///
    /// See [`StageRunner::submit`] and [`StageRunner::await_completion`].
    pub async fn run(
        &self,
        stage: &dyn StageDefinition,
        units: Vec<WorkUnit>,
        idempotent: bool,
        cancel: &CancellationToken,
    ) -> Result<StageResult, SeqflowError> {
        let submitted = self.submit(stage, units, idempotent).await?;
        self.await_completion(submitted, cancel).await
    }

    /// Plans every unit, skips the satisfied ones and submits the rest.
    ///
    /// Every job spec is built and every unit prepared before the first
    /// job is handed to the scheduler, so an invalid unit fails the stage
    /// with nothing submitted. A unit the scheduler refuses is recorded and
    /// the remaining units are still submitted.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit cannot be planned, its output directories
    /// cannot be created, its job spec is invalid or the scripts cannot be
    /// written. Scripts already written are removed first.
    pub async fn submit(
        &self,
        stage: &dyn StageDefinition,
        units: Vec<WorkUnit>,
        idempotent: bool,
    ) -> Result<SubmittedStage, SeqflowError> {
        let name = stage.name().to_string();
        let settings = self.config.stage(&name).cloned().unwrap_or_default();
        let mut result = StageResult::new(&name);
        let mut pending = Vec::new();

        for unit in units {
            let plan = stage.plan(&unit, &self.layout)?;

            if idempotent && plan.is_satisfied() {
                info!(stage = %name, unit = %unit.label(), "Outputs exist, skipping");
                self.events.emit(
                    names::UNIT_SKIPPED,
                    Some(serde_json::json!({"stage": name, "unit": unit.label()})),
                );
                result.transient.extend(plan.transient_paths().iter().cloned());
                result.skipped.push(SkippedUnit {
                    unit: unit.label(),
                    outputs: plan.outputs().to_vec(),
                });
            } else {
                pending.push((unit, plan));
            }
        }

        if pending.is_empty() {
            info!(stage = %name, skipped = result.skipped.len(), "Nothing to submit");
            return Ok(SubmittedStage {
                result,
                scripts: None,
                outputs: Vec::new(),
                policy: self.config.poll_policy_for(&name),
            });
        }

        let scripts = ScriptSet::write(
            stage.group_pattern(),
            &configured_templates(stage, &settings),
            &settings.modules,
            &self.config.scheduler.scratch_dir,
        )?;
        let group = scripts.group().clone();
        result.group = Some(group.clone());

        let jobs = match self.prepare_jobs(stage, &settings, &scripts, pending) {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(stage = %name, error = %err, "Stage cannot be submitted, nothing was queued");
                if let Err(remove_err) = scripts.remove() {
                    warn!(stage = %name, error = %remove_err, "Could not remove submission scripts");
                }
                return Err(err);
            }
        };

        info!(stage = %name, group = %group, units = jobs.len(), "Submitting jobs");

        let mut outputs = Vec::with_capacity(jobs.len());
        for (spec, plan) in jobs {
            let label = spec.unit().to_string();
            match self.scheduler.submit(&spec).await {
                Ok(handle) => {
                    debug!(stage = %name, unit = %label, job_id = %handle.id, "Unit submitted");
                    self.events.emit(
                        names::UNIT_SUBMITTED,
                        Some(serde_json::json!({"stage": name, "unit": label, "job_id": handle.id})),
                    );
                    result.submitted.push(handle);
                    outputs.push((label, plan));
                }
                Err(err) => {
                    warn!(stage = %name, unit = %label, error = %err, "Submission rejected");
                    self.events.emit(
                        names::UNIT_REJECTED,
                        Some(serde_json::json!({"stage": name, "unit": label, "reason": err.to_string()})),
                    );
                    result.kept.extend(plan.transient_paths().iter().cloned());
                    result.rejected.push(RejectedUnit {
                        unit: label,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(SubmittedStage {
            result,
            scripts: Some(scripts),
            outputs,
            policy: self.config.poll_policy_for(&name),
        })
    }

    /// Builds the job spec of every pending unit, then creates output
    /// directories and prepares inputs. Touches nothing on disk unless
    /// every spec is valid.
    fn prepare_jobs(
        &self,
        stage: &dyn StageDefinition,
        settings: &StageSettings,
        scripts: &ScriptSet,
        pending: Vec<(WorkUnit, JobPlan)>,
    ) -> Result<Vec<(JobSpec, JobPlan)>, SeqflowError> {
        let name = stage.name();
        let mut built = Vec::with_capacity(pending.len());

        for (slot, (unit, plan)) in pending.into_iter().enumerate() {
            let template = scripts
                .template(plan.variant())
                .ok_or_else(|| JobSpecError::UnknownVariant {
                    stage: name.to_string(),
                    variant: plan.variant().to_string(),
                })?
                .clone();

            let mut builder = JobSpec::builder(name, scripts.group().clone(), template)
                .slot(slot + 1)
                .unit(unit.label());
            for (key, value) in plan.bindings() {
                builder = match value {
                    BindingValue::Text(text) => builder.bind(key, text),
                    BindingValue::Path(path) => builder.bind_path(key, path),
                };
            }
            builder = builder.bind_all(settings.params.iter().map(|(k, v)| (k.clone(), v.clone())));
            for output in plan.outputs() {
                builder = builder.output(output);
            }
            built.push((unit, builder.build()?, plan));
        }

        let mut jobs = Vec::with_capacity(built.len());
        for (unit, spec, plan) in built {
            for dir in plan.output_dirs() {
                std::fs::create_dir_all(dir)?;
            }
            stage.prepare(&unit, &self.layout)?;
            jobs.push((spec, plan));
        }
        Ok(jobs)
    }

    /// Waits for the stage's job group, removes its scripts and records
    /// submitted units whose outputs are missing.
    ///
    /// The intermediates of a unit with missing outputs are moved to
    /// [`StageResult::kept`] so cleanup leaves them for a rerun.
    ///
    /// # Errors
    ///
    /// Returns the barrier error if the wait is cancelled or the scheduler
    /// cannot be polled.
    pub async fn await_completion(
        &self,
        submitted: SubmittedStage,
        cancel: &CancellationToken,
    ) -> Result<StageResult, SeqflowError> {
        let SubmittedStage {
            mut result,
            scripts,
            outputs,
            policy,
        } = submitted;

        let waited = match (&result.group, result.submitted.is_empty()) {
            (Some(group), false) => CompletionBarrier::new(self.scheduler.as_ref(), policy)
                .wait(group, cancel)
                .await
                .map(|_| ()),
            _ => Ok(()),
        };

        if let Some(scripts) = &scripts {
            if let Err(err) = scripts.remove() {
                warn!(stage = %result.stage, error = %err, "Could not remove submission scripts");
            }
        }
        waited?;

        for (label, plan) in &outputs {
            let missing = plan.missing_outputs();
            if missing.is_empty() {
                result.transient.extend(plan.transient_paths().iter().cloned());
            } else {
                warn!(stage = %result.stage, unit = %label, missing = ?missing, "Declared outputs missing");
                result.kept.extend(plan.transient_paths().iter().cloned());
                result.missing.push(label.clone());
            }
        }
        result.transient.retain(|path| !result.kept.contains(path));

        result.completed_at = now_utc();
        Ok(result)
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("genomes", &self.layout.len())
            .field("stages", &self.config.stages.len())
            .finish_non_exhaustive()
    }
}
