//! Read trimming with Trimmomatic.

use super::{file_name, genome_of, TRIM_FASTQ};
use crate::config::{DataLayout, PipelineConfig};
use crate::core::{SampleFiles, WorkUnit};
use crate::discovery::{NamingConvention, WorkUnitResolver};
use crate::errors::SeqflowError;
use crate::scheduler::StageTemplate;
use crate::stages::{JobPlan, StageDefinition};

const SINGLE_COMMAND: &str = "java -jar ${jar} SE -threads 1 ${in} ${out} \
ILLUMINACLIP:TruSeq3-SE.fa:2:30:10 LEADING:3 TRAILING:3 SLIDINGWINDOW:4:15 MINLEN:36";

const PAIRED_COMMAND: &str = "java -jar ${jar} PE -threads 1 ${ina} ${inb} ${outap} ${outau} ${outbp} ${outbu} \
ILLUMINACLIP:TruSeq3-PE.fa:2:30:10 LEADING:3 TRAILING:3 SLIDINGWINDOW:4:15 MINLEN:36";

/// Trims raw reads. Paired samples keep their pair marker in the output
/// names so that alignment can pair them again.
#[derive(Debug, Clone)]
pub struct TrimFastqStage {
    convention: NamingConvention,
}

impl Default for TrimFastqStage {
    fn default() -> Self {
        Self::new()
    }
}

impl TrimFastqStage {
    /// Creates the stage with the raw read naming convention.
    #[must_use]
    pub fn new() -> Self {
        Self {
            convention: NamingConvention::raw_reads(),
        }
    }
}

impl StageDefinition for TrimFastqStage {
    fn name(&self) -> &str {
        TRIM_FASTQ
    }

    fn group_pattern(&self) -> &str {
        "trimmomatic_%d"
    }

    fn templates(&self) -> Vec<StageTemplate> {
        vec![
            StageTemplate::new("single", "trimmomatic_se_%d.sh", SINGLE_COMMAND).providing(["in", "out"]),
            StageTemplate::new("paired", "trimmomatic_pe_%d.sh", PAIRED_COMMAND)
                .providing(["ina", "inb", "outap", "outau", "outbp", "outbu"]),
        ]
    }

    fn discover(&self, config: &PipelineConfig, layout: &DataLayout) -> Result<Vec<WorkUnit>, SeqflowError> {
        let resolver = WorkUnitResolver::new(self.convention.clone()).with_orphan_policy(config.orphans);
        let mut units = Vec::new();
        for (name, genome) in layout.iter() {
            units.extend(
                resolver
                    .resolve(&genome.fastq_dir)?
                    .map(|sample| WorkUnit::new(name, sample)),
            );
        }
        Ok(units)
    }

    fn plan(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<JobPlan, SeqflowError> {
        let genome = genome_of(TRIM_FASTQ, unit, layout)?;
        let out_dir = &genome.trimmomatic_output;
        let rename = |name: &str, replacement: &str| out_dir.join(self.convention.rewrite_suffix(name, replacement));

        let plan = match unit.sample().files() {
            SampleFiles::Single { path } => {
                let out = rename(&file_name(path), ".trimmed.{ext}");
                JobPlan::new("single")
                    .bind_path("in", path)
                    .bind_path("out", &out)
                    .output(out)
            }
            SampleFiles::Paired { forward, reverse } => {
                let (fwd, rev) = (file_name(forward), file_name(reverse));
                let outap = rename(&fwd, ".trimmed.paired.{ext}");
                let outau = rename(&fwd, ".trimmed.unpaired.{ext}");
                let outbp = rename(&rev, ".trimmed.paired.{ext}");
                let outbu = rename(&rev, ".trimmed.unpaired.{ext}");
                JobPlan::new("paired")
                    .bind_path("ina", forward)
                    .bind_path("inb", reverse)
                    .bind_path("outap", &outap)
                    .bind_path("outau", &outau)
                    .bind_path("outbp", &outbp)
                    .bind_path("outbu", &outbu)
                    .output(outap)
                    .output(outbp)
            }
        };

        Ok(plan.output_dir(out_dir))
    }
}
