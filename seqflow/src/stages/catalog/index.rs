//! Genome indexing with `hisat2-build` or `bowtie2-build`.

use tracing::debug;

use super::{genome_of, parent_dir, with_suffix, BUILD_INDEX};
use crate::config::{Aligner, DataLayout, PipelineConfig};
use crate::core::WorkUnit;
use crate::errors::SeqflowError;
use crate::scheduler::StageTemplate;
use crate::stages::{JobPlan, StageDefinition};

/// Builds one aligner index per genome.
#[derive(Debug, Clone, Copy)]
pub struct BuildIndexStage {
    aligner: Aligner,
}

impl BuildIndexStage {
    /// Creates the stage for an aligner.
    #[must_use]
    pub fn new(aligner: Aligner) -> Self {
        Self { aligner }
    }

    fn index_suffix(&self) -> &'static str {
        match self.aligner {
            Aligner::Hisat2 => ".1.ht2",
            Aligner::Tophat => ".1.bt2",
        }
    }
}

impl StageDefinition for BuildIndexStage {
    fn name(&self) -> &str {
        BUILD_INDEX
    }

    fn group_pattern(&self) -> &str {
        "build_index_%d"
    }

    fn templates(&self) -> Vec<StageTemplate> {
        let command = match self.aligner {
            Aligner::Hisat2 => "hisat2-build ${in} ${out}",
            Aligner::Tophat => "bowtie2-build ${in} ${out}",
        };
        vec![StageTemplate::new("default", "build_index_%d.sh", command).providing(["in", "out"])]
    }

    fn discover(&self, _config: &PipelineConfig, layout: &DataLayout) -> Result<Vec<WorkUnit>, SeqflowError> {
        Ok(layout
            .iter()
            .map(|(name, genome)| WorkUnit::genome_level(name, &genome.genome_fasta))
            .collect())
    }

    fn plan(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<JobPlan, SeqflowError> {
        let genome = genome_of(BUILD_INDEX, unit, layout)?;
        let mut plan = JobPlan::new("default")
            .bind_path("in", &genome.genome_fasta)
            .bind_path("out", &genome.indexing_output)
            .output(with_suffix(&genome.indexing_output, self.index_suffix()));
        if let Some(dir) = parent_dir(&genome.indexing_output) {
            plan = plan.output_dir(dir);
        }
        Ok(plan)
    }

    /// Places a copy of the genome next to the index, where TopHat expects
    /// to find it.
    fn prepare(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<(), SeqflowError> {
        let genome = genome_of(BUILD_INDEX, unit, layout)?;
        let copy = with_suffix(&genome.indexing_output, ".fa");
        std::fs::copy(&genome.genome_fasta, &copy)?;
        debug!(genome = unit.genome(), copy = %copy.display(), "Copied genome next to index");
        Ok(())
    }
}
