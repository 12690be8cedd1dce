//! Batch stage definitions and their execution.
//!
//! A [`StageDefinition`] knows the naming rules of one pipeline stage: how
//! to find its work units, which scripts it submits and what each job reads,
//! writes and leaves behind. The [`StageRunner`] turns those plans into
//! scheduler jobs and waits on the [`CompletionBarrier`].

mod barrier;
pub mod catalog;
mod runner;

pub use barrier::{BackoffStrategy, BarrierOutcome, CompletionBarrier, PollPolicy};
pub use runner::{StageRunner, SubmittedStage};

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::config::{DataLayout, PipelineConfig, StageSettings};
use crate::core::WorkUnit;
use crate::errors::SeqflowError;
use crate::scheduler::StageTemplate;

/// Trait for batch pipeline stages.
///
/// Implementations are pure descriptions; all side effects on the scheduler
/// go through the runner.
pub trait StageDefinition: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns the job group name pattern, containing `%d`.
    fn group_pattern(&self) -> &str;

    /// Returns the script templates with their default commands.
    fn templates(&self) -> Vec<StageTemplate>;

    /// Enumerates the work units of every genome.
    ///
    /// # Errors
    ///
    /// Returns an error if an input location cannot be read.
    fn discover(&self, config: &PipelineConfig, layout: &DataLayout) -> Result<Vec<WorkUnit>, SeqflowError>;

    /// Plans the job of one unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit's genome is not in the layout or lacks
    /// a path the stage needs.
    fn plan(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<JobPlan, SeqflowError>;

    /// Prepares inputs right before a unit is submitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs cannot be prepared.
    fn prepare(&self, _unit: &WorkUnit, _layout: &DataLayout) -> Result<(), SeqflowError> {
        Ok(())
    }
}

/// Returns the stage's templates with the configured command overrides
/// applied.
pub(crate) fn configured_templates(stage: &dyn StageDefinition, settings: &StageSettings) -> Vec<StageTemplate> {
    stage
        .templates()
        .into_iter()
        .map(|t| match settings.commands.get(&t.variant) {
            Some(command) => t.with_command(command.clone()),
            None => t,
        })
        .collect()
}

/// Lists the bindings no unit of the stage can satisfy: placeholders of a
/// configured command that its plans do not provide and
/// `[stages.<name>.params]` does not set.
///
/// Returns `(variant, keys)` pairs for the templates with gaps.
pub fn unbound_bindings(stage: &dyn StageDefinition, settings: &StageSettings) -> Vec<(String, Vec<String>)> {
    configured_templates(stage, settings)
        .into_iter()
        .filter_map(|template| {
            let keys: Vec<String> = template
                .unbound()
                .into_iter()
                .filter(|key| !settings.params.contains_key(key))
                .collect();
            (!keys.is_empty()).then(|| (template.variant, keys))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BindingValue {
    Text(String),
    Path(PathBuf),
}

/// What one unit's job reads, writes and leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    variant: String,
    bindings: Vec<(String, BindingValue)>,
    outputs: Vec<PathBuf>,
    output_dirs: Vec<PathBuf>,
    transient: Vec<PathBuf>,
}

impl JobPlan {
    /// Starts a plan for a template variant.
    #[must_use]
    pub fn new(variant: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            bindings: Vec::new(),
            outputs: Vec::new(),
            output_dirs: Vec::new(),
            transient: Vec::new(),
        }
    }

    /// Adds a text binding.
    #[must_use]
    pub fn bind(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.push((key.into(), BindingValue::Text(value.into())));
        self
    }

    /// Adds a path binding.
    #[must_use]
    pub fn bind_path(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.bindings.push((key.into(), BindingValue::Path(path.into())));
        self
    }

    /// Declares an output checked for idempotent skip and verification.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    /// Declares a directory created before submission.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dirs.push(path.into());
        self
    }

    /// Declares a path removed by cleanup once the stage is done.
    #[must_use]
    pub fn transient(mut self, path: impl Into<PathBuf>) -> Self {
        self.transient.push(path.into());
        self
    }

    /// Returns the template variant.
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Returns the declared outputs.
    #[must_use]
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    /// Returns the directories to create.
    #[must_use]
    pub fn output_dirs(&self) -> &[PathBuf] {
        &self.output_dirs
    }

    /// Returns the transient paths.
    #[must_use]
    pub fn transient_paths(&self) -> &[PathBuf] {
        &self.transient
    }

    /// Looks up a binding rendered as text.
    #[must_use]
    pub fn binding(&self, key: &str) -> Option<String> {
        self.bindings.iter().find(|(k, _)| k == key).map(|(_, v)| match v {
            BindingValue::Text(text) => text.clone(),
            BindingValue::Path(path) => path.to_string_lossy().into_owned(),
        })
    }

    pub(crate) fn bindings(&self) -> &[(String, BindingValue)] {
        &self.bindings
    }

    /// Returns true if every declared output exists.
    ///
    /// A plan without outputs is never satisfied.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        !self.outputs.is_empty() && self.outputs.iter().all(|p| p.exists())
    }

    /// Returns the declared outputs that do not exist.
    #[must_use]
    pub fn missing_outputs(&self) -> Vec<&Path> {
        self.outputs
            .iter()
            .filter(|p| !p.exists())
            .map(PathBuf::as_path)
            .collect()
    }
}
