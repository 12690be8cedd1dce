//! Pipeline sequencing.
//!
//! This module provides:
//! - The [`PipelineSequencer`], which runs stages in order
//! - Local steps for matrix assembly and quality checks
//! - The output [`VerifyPolicy`] applied after each batch stage

mod local;
mod policy;
mod sequencer;

#[cfg(test)]
mod integration_tests;

pub use local::{LocalOutcome, LocalStep, MatrixAssemblyStep, QualityCheckStep};
pub use policy::VerifyPolicy;
pub use sequencer::{PipelineReport, PipelineSequencer, SequencerOptions, StageReport};
