//! Protein domain annotation with InterProScan as one array job per genome.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{genome_of, INTERPRO};
use crate::config::{DataLayout, PipelineConfig};
use crate::core::WorkUnit;
use crate::errors::SeqflowError;
use crate::scheduler::StageTemplate;
use crate::stages::{JobPlan, StageDefinition};

const COMMAND: &str = "interproscan.sh -i ${in_dir}/${in_prefix}${SGE_TASK_ID} \
-o ${out_dir}/${out_prefix}${SGE_TASK_ID} -f tsv -dp -iprlookup -goterms";

const IN_PREFIX: &str = "interpro_in_";
const OUT_PREFIX: &str = "output_";

/// Default number of chunks the proteome is split into.
pub const DEFAULT_CHUNKS: usize = 100;

/// Splits each proteome into chunks and scans them as array tasks.
///
/// The chunk directory is transient.
#[derive(Debug, Clone, Copy)]
pub struct InterproStage {
    chunks: usize,
}

impl Default for InterproStage {
    fn default() -> Self {
        Self::new()
    }
}

impl InterproStage {
    /// Creates the stage with the default chunk count.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: DEFAULT_CHUNKS,
        }
    }

    /// Sets the chunk count (at least one).
    #[must_use]
    pub fn with_chunks(mut self, chunks: usize) -> Self {
        self.chunks = chunks.max(1);
        self
    }
}

impl StageDefinition for InterproStage {
    fn name(&self) -> &str {
        INTERPRO
    }

    fn group_pattern(&self) -> &str {
        "interproscan_%d"
    }

    fn templates(&self) -> Vec<StageTemplate> {
        vec![StageTemplate::new("default", "interproscan_%d.sh", COMMAND)
            .with_array(self.chunks)
            .providing(["in_dir", "in_prefix", "out_dir", "out_prefix"])]
    }

    fn discover(&self, _config: &PipelineConfig, layout: &DataLayout) -> Result<Vec<WorkUnit>, SeqflowError> {
        let mut units = Vec::new();
        for (name, genome) in layout.iter() {
            match (&genome.protein_fasta, &genome.interpro_output) {
                (Some(proteins), Some(_)) => units.push(WorkUnit::genome_level(name, proteins)),
                _ => info!(genome = name, "No protein_fasta/interpro_output, skipping InterProScan"),
            }
        }
        Ok(units)
    }

    fn plan(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<JobPlan, SeqflowError> {
        let genome = genome_of(INTERPRO, unit, layout)?;
        genome.require_protein_fasta(INTERPRO, unit.genome())?;
        let out_dir = genome.require_interpro_output(INTERPRO, unit.genome())?;
        let tmp_dir = out_dir.join("tmp");

        let mut plan = JobPlan::new("default")
            .bind_path("in_dir", &tmp_dir)
            .bind("in_prefix", IN_PREFIX)
            .bind_path("out_dir", out_dir)
            .bind("out_prefix", OUT_PREFIX)
            .output_dir(out_dir)
            .output_dir(&tmp_dir)
            .transient(&tmp_dir);
        for i in 1..=self.chunks {
            plan = plan.output(out_dir.join(format!("{OUT_PREFIX}{i}")));
        }
        Ok(plan)
    }

    fn prepare(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<(), SeqflowError> {
        let genome = genome_of(INTERPRO, unit, layout)?;
        let proteins = genome.require_protein_fasta(INTERPRO, unit.genome())?;
        let tmp_dir = genome.require_interpro_output(INTERPRO, unit.genome())?.join("tmp");
        let sequences = split_fasta(proteins, self.chunks, &tmp_dir, IN_PREFIX)?;
        debug!(genome = unit.genome(), sequences, chunks = self.chunks, "Split proteome");
        Ok(())
    }
}

/// Splits a FASTA file into `chunks` files named `<prefix><i>` (1-based)
/// inside `dir`, removing stop codon markers (`*`) from the sequences.
///
/// Every chunk file is written, even when there are fewer sequences than
/// chunks. Returns the number of sequences.
///
/// # Errors
///
/// Returns any IO error from reading the input or writing the chunks.
pub fn split_fasta(input: &Path, chunks: usize, dir: &Path, prefix: &str) -> std::io::Result<usize> {
    let chunks = chunks.max(1);
    let mut records: Vec<(String, String)> = Vec::new();

    for line in BufReader::new(File::open(input)?).lines() {
        let line = line?;
        let line = line.trim_end();
        if let Some(header) = line.strip_prefix('>') {
            records.push((header.to_string(), String::new()));
        } else if let Some((_, sequence)) = records.last_mut() {
            sequence.extend(line.chars().filter(|c| *c != '*'));
        }
    }

    std::fs::create_dir_all(dir)?;
    let per_chunk = records.len().div_ceil(chunks);
    let mut remaining = records.iter();

    for i in 1..=chunks {
        let mut out = BufWriter::new(File::create(dir.join(format!("{prefix}{i}")))?);
        for (header, sequence) in remaining.by_ref().take(per_chunk) {
            writeln!(out, ">{header}")?;
            writeln!(out, "{sequence}")?;
        }
        out.flush()?;
    }

    Ok(records.len())
}
