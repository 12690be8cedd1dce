//! In-process pipeline steps that do not use the scheduler.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::checks::{HtseqQuality, Hisat2Quality, QualityCheck, QualityLog, QualityWarning, TophatQuality};
use crate::config::{Aligner, DataLayout, PipelineConfig};
use crate::errors::SeqflowError;
use crate::events::{names, EventSink};
use crate::matrix::{ExpressionMatrix, MatrixTransform, HTSEQ_SUFFIX};
use crate::stages::catalog::{EXP_MATRIX, QUALITY};

/// What a local step produced.
#[derive(Debug, Clone, Default)]
pub struct LocalOutcome {
    /// Files written by the step.
    pub written: Vec<PathBuf>,
    /// Samples that failed a quality cutoff.
    pub warnings: Vec<QualityWarning>,
}

/// Trait for in-process steps.
///
/// Local steps have a reduced lifecycle: they either finish or fail.
pub trait LocalStep: Send + Sync + fmt::Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Runs the step over every genome.
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot complete.
    fn run(
        &self,
        config: &PipelineConfig,
        layout: &DataLayout,
        events: &dyn EventSink,
    ) -> Result<LocalOutcome, SeqflowError>;
}

/// Assembles each genome's htseq tables into an expression matrix.
///
/// With a transform attached, the transformed matrix is written as well,
/// to the genome's `exp_matrix_transformed_output`.
#[derive(Clone, Default)]
pub struct MatrixAssemblyStep {
    transform: Option<Arc<dyn MatrixTransform>>,
}

impl MatrixAssemblyStep {
    /// Creates the step without a transform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn MatrixTransform>) -> Self {
        self.transform = Some(transform);
        self
    }
}

impl fmt::Debug for MatrixAssemblyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixAssemblyStep")
            .field("transform", &self.transform.as_ref().map(|t| t.name().to_string()))
            .finish()
    }
}

impl LocalStep for MatrixAssemblyStep {
    fn name(&self) -> &str {
        EXP_MATRIX
    }

    fn run(
        &self,
        _config: &PipelineConfig,
        layout: &DataLayout,
        _events: &dyn EventSink,
    ) -> Result<LocalOutcome, SeqflowError> {
        let mut outcome = LocalOutcome::default();

        for (name, genome) in layout.iter() {
            let matrix = ExpressionMatrix::from_htseq_dir(&genome.htseq_output)?;
            if matrix.samples().is_empty() {
                warn!(genome = %name, dir = %genome.htseq_output.display(), "No htseq tables found");
            }
            matrix.write(&genome.exp_matrix_output)?;
            outcome.written.push(genome.exp_matrix_output.clone());

            match (&self.transform, &genome.exp_matrix_transformed_output) {
                (Some(transform), Some(path)) => {
                    info!(genome = %name, transform = transform.name(), "Transforming expression matrix");
                    transform.apply(&matrix, genome)?.write(path)?;
                    outcome.written.push(path.clone());
                }
                (Some(transform), None) => {
                    warn!(
                        genome = %name,
                        transform = transform.name(),
                        "No exp_matrix_transformed_output configured, transform skipped"
                    );
                }
                _ => {}
            }
        }

        Ok(outcome)
    }
}

/// Checks alignment and counting statistics against the genome cutoffs.
///
/// Failing samples become [`QualityWarning`]s; the step itself only fails
/// if the quality log cannot be written.
#[derive(Debug, Clone)]
pub struct QualityCheckStep {
    aligner: Aligner,
    log: QualityLog,
}

impl QualityCheckStep {
    /// Creates the step.
    #[must_use]
    pub fn new(aligner: Aligner, log: QualityLog) -> Self {
        Self { aligner, log }
    }

    /// Lists the alignment statistics files of a genome.
    fn alignment_stats(&self, dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            debug!(dir = %dir.display(), "No alignment output to check");
            return Vec::new();
        };

        let mut stats: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter_map(|path| match self.aligner {
                Aligner::Hisat2 => {
                    let is_stats = path.is_file() && path.extension().is_some_and(|ext| ext == "stats");
                    is_stats.then_some(path)
                }
                Aligner::Tophat => {
                    let summary = path.join("align_summary.txt");
                    (path.is_dir() && summary.is_file()).then_some(summary)
                }
            })
            .collect();
        stats.sort();
        stats
    }

    fn htseq_tables(dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            debug!(dir = %dir.display(), "No htseq output to check");
            return Vec::new();
        };

        let mut tables: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(HTSEQ_SUFFIX))
            })
            .collect();
        tables.sort();
        tables
    }

    fn check_all(
        &self,
        check: &dyn QualityCheck,
        genome: &str,
        files: &[PathBuf],
        cutoff: u32,
        events: &dyn EventSink,
        outcome: &mut LocalOutcome,
    ) -> Result<(), SeqflowError> {
        for file in files {
            let verdict = match check.check(file, cutoff) {
                Ok(verdict) => verdict,
                Err(err) => {
                    warn!(check = check.name(), path = %file.display(), error = %err, "Cannot read statistics");
                    continue;
                }
            };
            self.log.record(check.name(), file, &verdict)?;

            if !verdict.passed {
                let warning = QualityWarning::new(check.name(), genome, file.clone(), cutoff, verdict);
                warning.report();
                events.emit(names::QUALITY_WARNING, serde_json::to_value(&warning).ok());
                outcome.warnings.push(warning);
            }
        }
        Ok(())
    }
}

impl LocalStep for QualityCheckStep {
    fn name(&self) -> &str {
        QUALITY
    }

    fn run(
        &self,
        _config: &PipelineConfig,
        layout: &DataLayout,
        events: &dyn EventSink,
    ) -> Result<LocalOutcome, SeqflowError> {
        let mut outcome = LocalOutcome::default();
        let alignment_check: &dyn QualityCheck = match self.aligner {
            Aligner::Hisat2 => &Hisat2Quality,
            Aligner::Tophat => &TophatQuality,
        };

        for (name, genome) in layout.iter() {
            let stats = self.alignment_stats(&genome.alignment_output);
            self.check_all(alignment_check, name, &stats, genome.alignment_cutoff, events, &mut outcome)?;

            let tables = Self::htseq_tables(&genome.htseq_output);
            self.check_all(&HtseqQuality, name, &tables, genome.htseq_cutoff, events, &mut outcome)?;

            info!(
                genome = %name,
                alignments = stats.len(),
                counts = tables.len(),
                "Quality checked"
            );
        }

        if self.log.is_enabled() {
            outcome.written.push(self.log.path().to_path_buf());
        }
        Ok(outcome)
    }
}
