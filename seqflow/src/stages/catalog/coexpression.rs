//! Co-expression: PCC network and MCL clustering.

use super::{genome_of, parent_dir, MCL, PCC};
use crate::config::{DataLayout, PipelineConfig};
use crate::core::WorkUnit;
use crate::errors::SeqflowError;
use crate::scheduler::StageTemplate;
use crate::stages::{JobPlan, StageDefinition};

/// Computes pairwise PCC values from the expression matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct PccStage;

impl StageDefinition for PccStage {
    fn name(&self) -> &str {
        PCC
    }

    fn group_pattern(&self) -> &str {
        "pcc_wrapper_%d"
    }

    fn templates(&self) -> Vec<StageTemplate> {
        vec![StageTemplate::new(
            "default",
            "pcc_wrapper_%d.sh",
            "pcc.py ${in} ${out} ${mcl_out}",
        )
        .providing(["in", "out", "mcl_out"])]
    }

    fn discover(&self, _config: &PipelineConfig, layout: &DataLayout) -> Result<Vec<WorkUnit>, SeqflowError> {
        Ok(layout
            .iter()
            .map(|(name, genome)| WorkUnit::genome_level(name, genome.pcc_input()))
            .collect())
    }

    fn plan(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<JobPlan, SeqflowError> {
        let genome = genome_of(PCC, unit, layout)?;
        let mut plan = JobPlan::new("default")
            .bind_path("in", genome.pcc_input())
            .bind_path("out", &genome.pcc_output)
            .bind_path("mcl_out", &genome.pcc_mcl_output)
            .output(&genome.pcc_output)
            .output(&genome.pcc_mcl_output);
        for dir in [parent_dir(&genome.pcc_output), parent_dir(&genome.pcc_mcl_output)]
            .into_iter()
            .flatten()
        {
            plan = plan.output_dir(dir);
        }
        Ok(plan)
    }
}

/// Clusters the PCC network with MCL.
#[derive(Debug, Clone, Copy, Default)]
pub struct MclStage;

impl StageDefinition for MclStage {
    fn name(&self) -> &str {
        MCL
    }

    fn group_pattern(&self) -> &str {
        "cluster_pcc_%d"
    }

    fn templates(&self) -> Vec<StageTemplate> {
        vec![StageTemplate::new(
            "default",
            "cluster_pcc_%d.sh",
            "mcl ${in} --abc -o ${out} -te 4",
        )
        .providing(["in", "out"])]
    }

    fn discover(&self, _config: &PipelineConfig, layout: &DataLayout) -> Result<Vec<WorkUnit>, SeqflowError> {
        Ok(layout
            .iter()
            .map(|(name, genome)| WorkUnit::genome_level(name, &genome.pcc_mcl_output))
            .collect())
    }

    fn plan(&self, unit: &WorkUnit, layout: &DataLayout) -> Result<JobPlan, SeqflowError> {
        let genome = genome_of(MCL, unit, layout)?;
        let mut plan = JobPlan::new("default")
            .bind_path("in", &genome.pcc_mcl_output)
            .bind_path("out", &genome.mcl_cluster_output)
            .output(&genome.mcl_cluster_output);
        if let Some(dir) = parent_dir(&genome.mcl_cluster_output) {
            plan = plan.output_dir(dir);
        }
        Ok(plan)
    }
}
