//! Command line arguments.

use clap::Parser;
use std::path::PathBuf;

use seqflow::pipeline::SequencerOptions;
use seqflow::stages::catalog::{
    ALIGN, BUILD_INDEX, EXP_MATRIX, HTSEQ, INTERPRO, MCL, PCC, QUALITY, TRIM_FASTQ,
};

/// The stages `--skip-transcriptomics` turns off.
const TRANSCRIPTOMICS: [&str; 8] = [
    BUILD_INDEX, TRIM_FASTQ, ALIGN, HTSEQ, EXP_MATRIX, QUALITY, PCC, MCL,
];

#[derive(Debug, Parser)]
#[command(name = "seqflow")]
#[command(about = "Runs the transcriptome and protein domain pipelines on a Grid Engine cluster", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Pipeline settings file (TOML)
    pub config: PathBuf,

    /// Dataset layout file (TOML)
    pub data: PathBuf,

    /// Skip every transcriptome stage
    #[arg(long)]
    pub skip_transcriptomics: bool,

    /// Skip genome indexing
    #[arg(long, alias = "skip-bowtie-build")]
    pub skip_build_index: bool,

    /// Skip read trimming
    #[arg(long)]
    pub skip_trim_fastq: bool,

    /// Skip read alignment
    #[arg(long, alias = "skip-tophat")]
    pub skip_alignment: bool,

    /// Skip read counting
    #[arg(long)]
    pub skip_htseq: bool,

    /// Skip expression matrix assembly
    #[arg(long)]
    pub skip_exp_matrix: bool,

    /// Skip the sample quality check
    #[arg(long)]
    pub skip_quality: bool,

    /// Skip PCC calculation
    #[arg(long)]
    pub skip_pcc: bool,

    /// Skip MCL clustering
    #[arg(long)]
    pub skip_mcl: bool,

    /// Skip InterProScan
    #[arg(long)]
    pub skip_interpro: bool,

    /// Keep intermediate files and scheduler logs
    #[arg(long)]
    pub keep_intermediate: bool,

    /// Write quality statistics to the quality log
    #[arg(long)]
    pub enable_log: bool,

    /// Resubmit units even if their outputs exist
    #[arg(long)]
    pub overwrite: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Returns the stages disabled by the skip flags, in pipeline order.
    pub fn disabled_stages(&self) -> Vec<&'static str> {
        let flags = [
            (BUILD_INDEX, self.skip_build_index),
            (TRIM_FASTQ, self.skip_trim_fastq),
            (ALIGN, self.skip_alignment),
            (HTSEQ, self.skip_htseq),
            (EXP_MATRIX, self.skip_exp_matrix),
            (QUALITY, self.skip_quality),
            (PCC, self.skip_pcc),
            (MCL, self.skip_mcl),
            (INTERPRO, self.skip_interpro),
        ];

        flags
            .into_iter()
            .filter(|(name, skipped)| *skipped || (self.skip_transcriptomics && TRANSCRIPTOMICS.contains(name)))
            .map(|(name, _)| name)
            .collect()
    }

    /// Returns the sequencer options.
    pub fn options(&self) -> SequencerOptions {
        SequencerOptions {
            idempotent: !self.overwrite,
            keep_intermediate: self.keep_intermediate,
            enable_log: self.enable_log,
        }
    }
}
