//! Read counting with htseq-count.

use std::path::Path;
use tracing::debug;

use super::{genome_of, HTSEQ};
use crate::config::{Aligner, DataLayout, PipelineConfig};
use crate::core::{Sample, WorkUnit};
use crate::discovery::{NamingConvention, WorkUnitResolver};
use crate::errors::{DiscoveryError, SeqflowError};
use crate::scheduler::StageTemplate;
use crate::stages::{JobPlan, StageDefinition};

const COMMAND: &str = "htseq-count -s no -f ${itype} -t ${feature} -i ${field} ${bam} ${gff} > ${out}";

/// Counts reads per gene for every alignment.
///
/// HISAT2 alignments are `.sam` files; TopHat alignments are
/// `accepted_hits.bam` files inside one directory per sample. The
/// alignment itself is transient.
#[derive(Debug, Clone, Copy)]
pub struct CountStage {
    aligner: Aligner,
}

impl CountStage {
    /// Creates the stage for an aligner.
    #[must_use]
    pub fn new(aligner: Aligner) -> Self {
        Self { aligner }
    }
}

/// Lists `<dir>/<sample>/accepted_hits.bam` in sample order.
fn tophat_alignments(dir: &Path) -> Result<Vec<Sample>, DiscoveryError> {
    let io_err = |source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut samples = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.path().is_dir() {
            continue;
        }
        let bam = entry.path().join("accepted_hits.bam");
        if bam.is_file() {
            let id = entry.file_name().to_string_lossy().into_owned();
            samples.push(Sample::single(id, bam));
        } else {
            debug!(dir = %entry.path().display(), "No accepted_hits.bam, skipping");
        }
    }
    samples.sort_by(|a, b| a.id().cmp(b.id()));
    Ok(samples)
}

impl StageDefinition for CountStage {
    fn name(&self) -> &str {
        HTSEQ
    }

    fn group_pattern(&self) -> &str {
        "htseq_count_%d"
    }

    fn templates(&self) -> Vec<StageTemplate> {
        vec![StageTemplate::new("default", "htseq_count_%d.sh", COMMAND)
            .providing(["itype", "feature", "field", "bam", "gff", "out"])]
    }

    fn discover(&self, config: &PipelineConfig, layout: &DataLayout) -> Result<Vec<WorkUnit>, SeqflowError> {
        let mut units = Vec::new();
        for (name, genome) in layout.iter() {
            let samples: Vec<Sample> = match self.aligner {
                Aligner::Hisat2 => WorkUnitResolver::new(NamingConvention::sam())
                    .with_orphan_policy(config.orphans)
                    .resolve(&genome.alignment_output)?
                    .collect(),
                Aligner::Tophat => tophat_alignments(&genome.alignment_output)?,
            };
            units.extend(samples.into_iter().map(|sample| WorkUnit::new(name, sample)));
        }
        Ok(units)
    }

    fn plan(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<JobPlan, SeqflowError> {
        let genome = genome_of(HTSEQ, unit, layout)?;
        let alignment = unit
            .sample()
            .paths()
            .first()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| SeqflowError::stage(HTSEQ, format!("unit '{}' has no alignment", unit.label())))?;
        let out = genome.htseq_output.join(format!("{}.htseq", unit.sample().id()));
        let itype = match self.aligner {
            Aligner::Hisat2 => "sam",
            Aligner::Tophat => "bam",
        };

        Ok(JobPlan::new("default")
            .bind("itype", itype)
            .bind("feature", &genome.gff_feature)
            .bind("field", &genome.gff_id)
            .bind_path("bam", &alignment)
            .bind_path("gff", &genome.gff_file)
            .bind_path("out", &out)
            .output(out)
            .output_dir(&genome.htseq_output)
            .transient(alignment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::genome_layout;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_discover_sam_files() {
        let dir = tempfile::tempdir().unwrap();
        let genome = genome_layout(dir.path());
        std::fs::create_dir_all(&genome.alignment_output).unwrap();
        for name in ["A.sam", "A.stats", "B.sam"] {
            std::fs::write(genome.alignment_output.join(name), "").unwrap();
        }
        let layout = DataLayout::new().with_genome("zma", genome);

        let units = CountStage::new(Aligner::Hisat2)
            .discover(&PipelineConfig::new(), &layout)
            .unwrap();
        let labels: Vec<_> = units.iter().map(WorkUnit::label).collect();
        assert_eq!(labels, vec!["zma:A", "zma:B"]);
    }

    #[test]
    fn test_discover_tophat_directories() {
        let dir = tempfile::tempdir().unwrap();
        let genome = genome_layout(dir.path());
        for sample in ["B", "A", "C"] {
            std::fs::create_dir_all(genome.alignment_output.join(sample)).unwrap();
        }
        std::fs::write(genome.alignment_output.join("A").join("accepted_hits.bam"), "").unwrap();
        std::fs::write(genome.alignment_output.join("B").join("accepted_hits.bam"), "").unwrap();
        let layout = DataLayout::new().with_genome("zma", genome);

        let units = CountStage::new(Aligner::Tophat)
            .discover(&PipelineConfig::new(), &layout)
            .unwrap();
        let labels: Vec<_> = units.iter().map(WorkUnit::label).collect();
        assert_eq!(labels, vec!["zma:A", "zma:B"]);
    }

    #[test]
    fn test_plan() {
        let layout = DataLayout::new().with_genome("zma", genome_layout(Path::new("/w")));
        let unit = WorkUnit::new("zma", Sample::single("A", "/w/aligned/A.sam"));

        let plan = CountStage::new(Aligner::Hisat2).plan(&unit, &layout).unwrap();
        assert_eq!(plan.binding("itype").as_deref(), Some("sam"));
        assert_eq!(plan.binding("feature").as_deref(), Some("CDS"));
        assert_eq!(plan.binding("field").as_deref(), Some("Parent"));
        assert_eq!(plan.outputs(), &[PathBuf::from("/w/htseq/A.htseq")]);
        assert_eq!(plan.transient_paths(), &[PathBuf::from("/w/aligned/A.sam")]);
    }
}
