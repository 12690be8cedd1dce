//! Dataset layout: per-genome inputs and per-role output locations.
//!
//! Stage N's output location is stage N+1's input location, so the layout
//! is the only thing that threads data between stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::{ConfigError, SeqflowError};

/// Input files and output locations for one genome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeLayout {
    /// Genome sequence.
    pub genome_fasta: PathBuf,
    /// Gene annotation.
    pub gff_file: PathBuf,
    /// Annotation feature counted by htseq-count.
    #[serde(default = "default_gff_feature")]
    pub gff_feature: String,
    /// Annotation attribute used as gene id.
    #[serde(default = "default_gff_id")]
    pub gff_id: String,
    /// Coding sequences, consumed by normalization collaborators.
    #[serde(default)]
    pub cds_fasta: Option<PathBuf>,
    /// Protein sequences for InterProScan.
    #[serde(default)]
    pub protein_fasta: Option<PathBuf>,

    /// Directory holding the raw reads.
    pub fastq_dir: PathBuf,
    /// Index prefix written by the indexing stage.
    pub indexing_output: PathBuf,
    /// Trimmed reads directory.
    pub trimmomatic_output: PathBuf,
    /// Alignment output directory.
    pub alignment_output: PathBuf,
    /// Read count tables directory.
    pub htseq_output: PathBuf,
    /// Raw expression matrix file.
    pub exp_matrix_output: PathBuf,
    /// Transformed expression matrix, when a transform is configured.
    #[serde(default)]
    pub exp_matrix_transformed_output: Option<PathBuf>,
    /// PCC table.
    pub pcc_output: PathBuf,
    /// PCC table in MCL input format.
    pub pcc_mcl_output: PathBuf,
    /// MCL clusters.
    pub mcl_cluster_output: PathBuf,
    /// InterProScan output directory.
    #[serde(default)]
    pub interpro_output: Option<PathBuf>,

    /// Minimum alignment rate (percent) before a quality warning.
    #[serde(default, alias = "tophat_cutoff")]
    pub alignment_cutoff: u32,
    /// Minimum assigned-read rate (percent) before a quality warning.
    #[serde(default)]
    pub htseq_cutoff: u32,
}

fn default_gff_feature() -> String {
    "CDS".to_string()
}

fn default_gff_id() -> String {
    "Parent".to_string()
}

impl GenomeLayout {
    /// Returns the matrix consumed by the PCC stage.
    #[must_use]
    pub fn pcc_input(&self) -> &Path {
        self.exp_matrix_transformed_output
            .as_deref()
            .unwrap_or(&self.exp_matrix_output)
    }

    /// Returns the protein fasta, or a stage error if it is not configured.
    ///
    /// # Errors
    ///
    /// Returns `SeqflowError::Stage` naming the genome.
    pub fn require_protein_fasta(&self, stage: &str, genome: &str) -> Result<&Path, SeqflowError> {
        self.protein_fasta
            .as_deref()
            .ok_or_else(|| SeqflowError::stage(stage, format!("genome '{genome}' has no protein_fasta")))
    }

    /// Returns the InterProScan output directory, or a stage error.
    ///
    /// # Errors
    ///
    /// Returns `SeqflowError::Stage` naming the genome.
    pub fn require_interpro_output(&self, stage: &str, genome: &str) -> Result<&Path, SeqflowError> {
        self.interpro_output
            .as_deref()
            .ok_or_else(|| SeqflowError::stage(stage, format!("genome '{genome}' has no interpro_output")))
    }
}

/// All genomes of a dataset, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLayout {
    /// Genome layouts in name order.
    #[serde(default)]
    pub genomes: BTreeMap<String, GenomeLayout>,
}

impl DataLayout {
    /// Creates an empty layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the layout from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        super::load_toml(path)
    }

    /// Adds a genome.
    #[must_use]
    pub fn with_genome(mut self, name: impl Into<String>, genome: GenomeLayout) -> Self {
        self.genomes.insert(name.into(), genome);
        self
    }

    /// Returns a genome by name.
    #[must_use]
    pub fn genome(&self, name: &str) -> Option<&GenomeLayout> {
        self.genomes.get(name)
    }

    /// Iterates genomes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GenomeLayout)> {
        self.genomes.iter().map(|(name, genome)| (name.as_str(), genome))
    }

    /// Returns the number of genomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.genomes.len()
    }

    /// Returns true if no genome is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }
}
