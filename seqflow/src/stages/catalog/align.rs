//! Read alignment with HISAT2 or TopHat.

use std::path::PathBuf;

use super::{file_name, genome_of, ALIGN};
use crate::config::{Aligner, DataLayout, PipelineConfig};
use crate::core::{SampleFiles, WorkUnit};
use crate::discovery::{NamingConvention, WorkUnitResolver};
use crate::errors::SeqflowError;
use crate::scheduler::StageTemplate;
use crate::stages::{JobPlan, StageDefinition};

/// Aligns trimmed reads against the genome index.
///
/// The trimmed reads, including the unpaired leftovers of paired samples,
/// are transient: they are removed once alignment is done unless
/// intermediates are kept.
#[derive(Debug, Clone)]
pub struct AlignStage {
    aligner: Aligner,
    convention: NamingConvention,
}

impl AlignStage {
    /// Creates the stage for an aligner.
    #[must_use]
    pub fn new(aligner: Aligner) -> Self {
        Self {
            aligner,
            convention: NamingConvention::trimmed_reads(),
        }
    }
}

/// The unpaired leftover written next to a paired trimmed file.
fn unpaired_sibling(path: &std::path::Path) -> Option<PathBuf> {
    let name = file_name(path);
    name.contains(".trimmed.paired.")
        .then(|| path.with_file_name(name.replacen(".trimmed.paired.", ".trimmed.unpaired.", 1)))
}

impl StageDefinition for AlignStage {
    fn name(&self) -> &str {
        ALIGN
    }

    fn group_pattern(&self) -> &str {
        match self.aligner {
            Aligner::Hisat2 => "hisat2_%d",
            Aligner::Tophat => "tophat_%d",
        }
    }

    fn templates(&self) -> Vec<StageTemplate> {
        match self.aligner {
            Aligner::Hisat2 => vec![
                StageTemplate::new(
                    "single",
                    "hisat2_se_%d.sh",
                    "hisat2 -p 1 -x ${genome} -U ${fq} -S ${out} 2> ${stats}",
                )
                .providing(["genome", "fq", "out", "stats"]),
                StageTemplate::new(
                    "paired",
                    "hisat2_pe_%d.sh",
                    "hisat2 -p 1 -x ${genome} -1 ${forward} -2 ${reverse} -S ${out} 2> ${stats}",
                )
                .providing(["genome", "forward", "reverse", "out", "stats"]),
            ],
            Aligner::Tophat => vec![
                StageTemplate::new("single", "tophat_se_%d.sh", "tophat -p 1 -o ${out} ${genome} ${fq}")
                    .providing(["genome", "fq", "out"]),
                StageTemplate::new(
                    "paired",
                    "tophat_pe_%d.sh",
                    "tophat -p 1 -o ${out} ${genome} ${forward} ${reverse}",
                )
                .providing(["genome", "forward", "reverse", "out"]),
            ],
        }
    }

    fn discover(&self, config: &PipelineConfig, layout: &DataLayout) -> Result<Vec<WorkUnit>, SeqflowError> {
        let resolver = WorkUnitResolver::new(self.convention.clone()).with_orphan_policy(config.orphans);
        let mut units = Vec::new();
        for (name, genome) in layout.iter() {
            units.extend(
                resolver
                    .resolve(&genome.trimmomatic_output)?
                    .map(|sample| WorkUnit::new(name, sample)),
            );
        }
        Ok(units)
    }

    fn plan(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<JobPlan, SeqflowError> {
        let genome = genome_of(ALIGN, unit, layout)?;
        let id = unit.sample().id();
        let out_dir = &genome.alignment_output;

        let mut plan = match unit.sample().files() {
            SampleFiles::Single { path } => JobPlan::new("single").bind_path("fq", path),
            SampleFiles::Paired { forward, reverse } => JobPlan::new("paired")
                .bind_path("forward", forward)
                .bind_path("reverse", reverse),
        }
        .bind_path("genome", &genome.indexing_output)
        .output_dir(out_dir);

        plan = match self.aligner {
            Aligner::Hisat2 => {
                let sam = out_dir.join(format!("{id}.sam"));
                plan.bind_path("out", &sam)
                    .bind_path("stats", out_dir.join(format!("{id}.stats")))
                    .output(sam)
            }
            Aligner::Tophat => {
                let sample_dir = out_dir.join(id);
                plan.bind_path("out", &sample_dir)
                    .output(sample_dir.join("accepted_hits.bam"))
            }
        };

        for path in unit.sample().paths() {
            plan = plan.transient(path);
            if let Some(sibling) = unpaired_sibling(path) {
                plan = plan.transient(sibling);
            }
        }

        Ok(plan)
    }
}
