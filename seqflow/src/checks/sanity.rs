//! Configuration and dataset sanity checks.

use std::path::Path;

use crate::config::{DataLayout, PipelineConfig};

/// Validates configuration or data before a run.
pub trait SanityCheck: Send + Sync {
    /// Returns the name of the check.
    fn name(&self) -> &str;

    /// Returns every problem found; empty means the check passed.
    fn check(&self, config: &PipelineConfig, layout: &DataLayout) -> Vec<String>;
}

/// Checks the pipeline settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigSanity;

impl SanityCheck for ConfigSanity {
    fn name(&self) -> &str {
        "config"
    }

    fn check(&self, config: &PipelineConfig, _layout: &DataLayout) -> Vec<String> {
        let mut problems = Vec::new();

        if config.scheduler.submit_command.trim().is_empty() {
            problems.push("scheduler.submit_command is empty".to_string());
        }
        if config.scheduler.status_command.trim().is_empty() {
            problems.push("scheduler.status_command is empty".to_string());
        }
        if config.polling.interval_ms == 0 {
            problems.push("polling.interval_ms must be positive".to_string());
        }
        if config.polling.max_polls == Some(0) {
            problems.push("polling.max_polls must be positive".to_string());
        }

        for (stage, settings) in &config.stages {
            for (variant, command) in &settings.commands {
                if command.trim().is_empty() {
                    problems.push(format!("stages.{stage}.commands.{variant} is empty"));
                }
            }
            if settings.poll_interval_ms == Some(0) {
                problems.push(format!("stages.{stage}.poll_interval_ms must be positive"));
            }
        }

        problems
    }
}

/// Checks that every genome's inputs exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetSanity;

impl DatasetSanity {
    fn require_file(problems: &mut Vec<String>, genome: &str, role: &str, path: &Path) {
        if !path.is_file() {
            problems.push(format!("{genome}: {role} {} does not exist", path.display()));
        }
    }
}

impl SanityCheck for DatasetSanity {
    fn name(&self) -> &str {
        "data"
    }

    fn check(&self, _config: &PipelineConfig, layout: &DataLayout) -> Vec<String> {
        let mut problems = Vec::new();

        if layout.is_empty() {
            problems.push("no genomes configured".to_string());
        }

        for (name, genome) in layout.iter() {
            Self::require_file(&mut problems, name, "genome_fasta", &genome.genome_fasta);
            Self::require_file(&mut problems, name, "gff_file", &genome.gff_file);
            if let Some(proteins) = &genome.protein_fasta {
                Self::require_file(&mut problems, name, "protein_fasta", proteins);
            }
            if let Some(cds) = &genome.cds_fasta {
                Self::require_file(&mut problems, name, "cds_fasta", cds);
            }
            if !genome.fastq_dir.is_dir() {
                problems.push(format!(
                    "{name}: fastq_dir {} is not a directory",
                    genome.fastq_dir.display()
                ));
            }
            if genome.alignment_cutoff > 100 || genome.htseq_cutoff > 100 {
                problems.push(format!("{name}: cutoffs are percentages and must be at most 100"));
            }
        }

        problems
    }
}
