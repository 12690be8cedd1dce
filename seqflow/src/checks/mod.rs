//! Collaborators that validate the run before and after the batch stages.
//!
//! - [`SanityCheck`]: configuration and dataset validity, checked before
//!   any stage runs.
//! - [`QualityCheck`]: per-sample mapping statistics against a cutoff,
//!   reported as [`QualityWarning`]s without stopping the pipeline.

mod quality;
mod sanity;

pub use quality::{
    HtseqQuality, Hisat2Quality, QualityCheck, QualityLog, QualityVerdict, QualityWarning, TophatQuality,
};
pub use sanity::{ConfigSanity, DatasetSanity, SanityCheck};
