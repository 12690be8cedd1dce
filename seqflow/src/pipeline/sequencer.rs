//! Ordered execution of batch stages and local steps.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use super::local::{LocalOutcome, LocalStep, MatrixAssemblyStep, QualityCheckStep};
use crate::cancellation::CancellationToken;
use crate::checks::{ConfigSanity, DatasetSanity, QualityLog, QualityWarning, SanityCheck};
use crate::config::{DataLayout, PipelineConfig, StageSettings};
use crate::core::{StageKind, StageResult, StageState};
use crate::errors::{SeqflowError, TransitionError};
use crate::events::{names, EventSink};
use crate::janitor::{ArtifactJanitor, CleanupReport};
use crate::scheduler::SchedulerClient;
use crate::stages::catalog::{
    AlignStage, BuildIndexStage, CountStage, InterproStage, MclStage, PccStage, TrimFastqStage,
};
use crate::stages::{unbound_bindings, StageDefinition, StageRunner};
use crate::utils::format_elapsed;

/// Run-wide switches, usually taken from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequencerOptions {
    /// Skip units whose outputs already exist.
    pub idempotent: bool,
    /// Keep transient files and scheduler logs.
    pub keep_intermediate: bool,
    /// Write the quality log.
    pub enable_log: bool,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            idempotent: true,
            keep_intermediate: false,
            enable_log: false,
        }
    }
}

enum Step {
    Batch(Box<dyn StageDefinition>),
    Local(Box<dyn LocalStep>),
}

impl Step {
    fn name(&self) -> &str {
        match self {
            Self::Batch(stage) => stage.name(),
            Self::Local(step) => step.name(),
        }
    }

    fn kind(&self) -> StageKind {
        match self {
            Self::Batch(_) => StageKind::Batch,
            Self::Local(_) => StageKind::Local,
        }
    }
}

struct Entry {
    step: Step,
    enabled: bool,
    state: StageState,
}

impl Entry {
    fn transition(
        &mut self,
        next: StageState,
        events: &dyn EventSink,
        data: serde_json::Value,
    ) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next, self.step.kind()) {
            return Err(TransitionError {
                stage: self.step.name().to_string(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;

        let event = match next {
            StageState::Submitted => names::STAGE_SUBMITTED,
            StageState::AwaitingCompletion => names::STAGE_AWAITING,
            StageState::Cleaned => names::STAGE_CLEANED,
            StageState::Done => names::STAGE_DONE,
            StageState::Skipped => names::STAGE_SKIPPED,
            StageState::Failed => names::STAGE_FAILED,
            StageState::NotRun => return Ok(()),
        };
        let mut payload = serde_json::json!({"stage": self.step.name(), "kind": self.step.kind()});
        if let (Some(payload), serde_json::Value::Object(extra)) = (payload.as_object_mut(), data) {
            payload.extend(extra);
        }
        events.emit(event, Some(payload));
        Ok(())
    }
}

/// What happened to one stage during a run.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    /// The stage name.
    pub name: String,
    /// Batch or local.
    pub kind: StageKind,
    /// The final state.
    pub state: StageState,
    /// The batch stage result.
    pub result: Option<StageResult>,
    /// The cleanup pass after a batch stage.
    pub cleanup: Option<CleanupReport>,
    /// Quality warnings raised by a local step.
    pub warnings: Vec<QualityWarning>,
}

impl StageReport {
    fn new(name: &str, kind: StageKind, state: StageState) -> Self {
        Self {
            name: name.to_string(),
            kind,
            state,
            result: None,
            cleanup: None,
            warnings: Vec::new(),
        }
    }
}

/// Outcome of a complete pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    /// One report per stage, in run order.
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    /// Returns the report of a stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns every quality warning of the run.
    pub fn quality_warnings(&self) -> impl Iterator<Item = &QualityWarning> {
        self.stages.iter().flat_map(|s| s.warnings.iter())
    }

    /// Returns the names of stages that ran to completion.
    #[must_use]
    pub fn completed(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.state == StageState::Done)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Runs stages strictly in order after the sanity checks pass.
///
/// A sequencer runs once. There is no automatic retry: a failed run is
/// resumed by starting the process again, and units whose outputs exist
/// are skipped.
pub struct PipelineSequencer {
    config: Arc<PipelineConfig>,
    layout: Arc<DataLayout>,
    events: Arc<dyn EventSink>,
    runner: StageRunner,
    janitor: ArtifactJanitor,
    checks: Vec<Box<dyn SanityCheck>>,
    entries: Vec<Entry>,
    options: SequencerOptions,
}

impl PipelineSequencer {
    /// Creates a sequencer without stages and with the default sanity
    /// checks on configuration and dataset.
    pub fn new(
        config: Arc<PipelineConfig>,
        layout: Arc<DataLayout>,
        scheduler: Arc<dyn SchedulerClient>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let runner = StageRunner::new(scheduler, Arc::clone(&config), Arc::clone(&layout), Arc::clone(&events));
        let janitor = ArtifactJanitor::new(&config.scheduler.log_dir);
        Self {
            config,
            layout,
            events,
            runner,
            janitor,
            checks: vec![Box::new(ConfigSanity), Box::new(DatasetSanity)],
            entries: Vec::new(),
            options: SequencerOptions::default(),
        }
    }

    /// Creates a sequencer with the standard transcriptome and protein
    /// domain stages:
    /// `build_index, trim_fastq, align, htseq, exp_matrix, quality, pcc, mcl, interpro`.
    pub fn standard(
        config: Arc<PipelineConfig>,
        layout: Arc<DataLayout>,
        scheduler: Arc<dyn SchedulerClient>,
        events: Arc<dyn EventSink>,
        options: SequencerOptions,
    ) -> Self {
        let aligner = config.aligner;
        let quality_log = QualityLog::new(&config.quality_log, options.enable_log);

        Self::new(config, layout, scheduler, events)
            .with_options(options)
            .batch(BuildIndexStage::new(aligner))
            .batch(TrimFastqStage::new())
            .batch(AlignStage::new(aligner))
            .batch(CountStage::new(aligner))
            .local(MatrixAssemblyStep::new())
            .local(QualityCheckStep::new(aligner, quality_log))
            .batch(PccStage)
            .batch(MclStage)
            .batch(InterproStage::new())
    }

    /// Sets the run options.
    #[must_use]
    pub fn with_options(mut self, options: SequencerOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds a sanity check.
    #[must_use]
    pub fn with_sanity_check(mut self, check: impl SanityCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Appends a batch stage.
    #[must_use]
    pub fn batch(mut self, stage: impl StageDefinition + 'static) -> Self {
        self.entries.push(Entry {
            step: Step::Batch(Box::new(stage)),
            enabled: true,
            state: StageState::NotRun,
        });
        self
    }

    /// Appends a local step.
    #[must_use]
    pub fn local(mut self, step: impl LocalStep + 'static) -> Self {
        self.entries.push(Entry {
            step: Step::Local(Box::new(step)),
            enabled: true,
            state: StageState::NotRun,
        });
        self
    }

    /// Disables a stage for this run. Returns false if no stage has that name.
    pub fn disable(&mut self, name: &str) -> bool {
        let mut found = false;
        for entry in self.entries.iter_mut().filter(|e| e.step.name() == name) {
            entry.enabled = false;
            found = true;
        }
        found
    }

    /// Returns the stage names in run order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.step.name()).collect()
    }

    /// Returns the current state of a stage.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<StageState> {
        self.entries.iter().find(|e| e.step.name() == name).map(|e| e.state)
    }

    /// Returns the run options.
    #[must_use]
    pub fn options(&self) -> SequencerOptions {
        self.options
    }

    /// Runs every sanity check, and checks that each enabled batch stage's
    /// commands can be fully bound from its plans and stage params.
    ///
    /// # Errors
    ///
    /// Returns [`SeqflowError::Configuration`] listing every problem found.
    pub fn validate(&self) -> Result<(), SeqflowError> {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for name in self.stage_names() {
            if !seen.insert(name) {
                problems.push(format!("stage '{name}' is scheduled twice"));
            }
        }

        for check in &self.checks {
            for problem in check.check(&self.config, &self.layout) {
                problems.push(format!("[{}] {problem}", check.name()));
            }
        }

        let no_settings = StageSettings::default();
        for entry in self.entries.iter().filter(|e| e.enabled) {
            let Step::Batch(stage) = &entry.step else {
                continue;
            };
            let settings = self.config.stage(stage.name()).unwrap_or(&no_settings);
            for (variant, keys) in unbound_bindings(stage.as_ref(), settings) {
                problems.push(format!(
                    "[stages] {} '{variant}' command needs {} in [stages.{}.params]",
                    stage.name(),
                    keys.join(", "),
                    stage.name()
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SeqflowError::configuration(problems))
        }
    }

    /// Runs the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the sanity checks fail, in which
    /// case no stage ran. Otherwise returns the first hard stage error;
    /// the failing stage is left in [`StageState::Failed`] and later
    /// stages in [`StageState::NotRun`].
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<PipelineReport, SeqflowError> {
        if let Err(err) = self.validate() {
            error!(error = %err, "Sanity checks failed, nothing was run");
            return Err(err);
        }

        std::fs::create_dir_all(&self.config.scheduler.scratch_dir)?;
        std::fs::create_dir_all(&self.config.scheduler.log_dir)?;

        let started = Instant::now();
        let mut report = PipelineReport::default();

        let ctx = RunContext {
            config: &self.config,
            layout: &self.layout,
            events: self.events.as_ref(),
            runner: &self.runner,
            janitor: &self.janitor,
            options: self.options,
        };

        for entry in &mut self.entries {
            let name = entry.step.name().to_string();
            let kind = entry.step.kind();

            if !entry.enabled {
                info!(stage = %name, "Stage disabled, skipping");
                entry.transition(StageState::Skipped, ctx.events, serde_json::json!({}))?;
                report.stages.push(StageReport::new(&name, kind, StageState::Skipped));
                continue;
            }

            if let Some(reason) = cancel.reason() {
                warn!(stage = %name, reason = %reason, "Run cancelled");
                return Err(SeqflowError::Cancelled { stage: name, reason });
            }

            let stage_started = Instant::now();
            info!(stage = %name, kind = %kind, "Starting stage");

            let outcome = match kind {
                StageKind::Batch => ctx.run_batch(entry, cancel).await,
                StageKind::Local => ctx.run_local(entry),
            };

            match outcome {
                Ok(stage_report) => {
                    info!(
                        stage = %name,
                        elapsed = %format_elapsed(stage_started.elapsed()),
                        "Stage done"
                    );
                    report.stages.push(stage_report);
                }
                Err(err) => {
                    error!(stage = %name, error = %err, "Stage failed");
                    if entry.state.can_transition_to(StageState::Failed, kind) {
                        entry.transition(
                            StageState::Failed,
                            ctx.events,
                            serde_json::json!({"error": err.to_string()}),
                        )?;
                    }
                    return Err(err);
                }
            }
        }

        info!(
            stages = report.stages.len(),
            warnings = report.quality_warnings().count(),
            elapsed = %format_elapsed(started.elapsed()),
            "Pipeline finished"
        );
        Ok(report)
    }
}

struct RunContext<'a> {
    config: &'a PipelineConfig,
    layout: &'a DataLayout,
    events: &'a dyn EventSink,
    runner: &'a StageRunner,
    janitor: &'a ArtifactJanitor,
    options: SequencerOptions,
}

impl RunContext<'_> {
    async fn run_batch(&self, entry: &mut Entry, cancel: &CancellationToken) -> Result<StageReport, SeqflowError> {
        let Step::Batch(stage) = &entry.step else {
            return Err(SeqflowError::stage(entry.step.name(), "not a batch stage"));
        };
        let name = stage.name().to_string();

        let units = stage.discover(self.config, self.layout)?;
        let submitted = self.runner.submit(stage.as_ref(), units, self.options.idempotent).await?;
        entry.transition(StageState::Submitted, self.events, submitted.result().summary())?;

        let group = submitted.result().group.as_ref().map(|g| g.as_str().to_string());
        entry.transition(StageState::AwaitingCompletion, self.events, serde_json::json!({"group": group}))?;

        let result = self.runner.await_completion(submitted, cancel).await?;
        self.config.verify.apply(&result, self.events)?;

        let cleanup = self.janitor.cleanup(&result, self.options.keep_intermediate);
        entry.transition(
            StageState::Cleaned,
            self.events,
            serde_json::json!({
                "retained": cleanup.retained,
                "removed": cleanup.removed.len(),
                "failed": cleanup.failed.len(),
            }),
        )?;

        entry.transition(StageState::Done, self.events, result.summary())?;

        let mut report = StageReport::new(&name, StageKind::Batch, StageState::Done);
        report.result = Some(result);
        report.cleanup = Some(cleanup);
        Ok(report)
    }

    fn run_local(&self, entry: &mut Entry) -> Result<StageReport, SeqflowError> {
        let Step::Local(step) = &entry.step else {
            return Err(SeqflowError::stage(entry.step.name(), "not a local step"));
        };
        let name = step.name().to_string();

        let LocalOutcome { written, warnings } = step.run(self.config, self.layout, self.events)?;
        entry.transition(
            StageState::Done,
            self.events,
            serde_json::json!({"written": written, "warnings": warnings.len()}),
        )?;

        let mut report = StageReport::new(&name, StageKind::Local, StageState::Done);
        report.warnings = warnings;
        Ok(report)
    }
}

impl std::fmt::Debug for PipelineSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSequencer")
            .field("stages", &self.stage_names())
            .field("options", &self.options)
            .field("checks", &self.checks.len())
            .finish_non_exhaustive()
    }
}
