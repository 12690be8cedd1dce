//! # Seqflow
//!
//! Stage orchestration for batch-scheduled genomic pipelines.
//!
//! Seqflow drives an RNA-seq transcriptome pipeline and a protein domain
//! annotation pipeline on a Grid Engine style cluster. Every heavy step runs
//! as a scheduler job; the engine only decides what to submit, waits for it
//! and cleans up after it:
//!
//! - **Work unit discovery**: group input files into single-end and
//!   paired-end samples by naming convention
//! - **Job submission**: validated job specs handed to `qsub`, one per unit
//! - **Completion barrier**: poll the job group until it drains
//! - **Idempotent resume**: skip units whose outputs already exist
//! - **Cleanup**: remove transient files and scheduler logs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seqflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Arc::new(PipelineConfig::from_file(Path::new("seqflow.toml"))?);
//! let layout = Arc::new(DataLayout::from_file(Path::new("data.toml"))?);
//! let scheduler = Arc::new(GridEngineClient::from_config(&config));
//!
//! let mut sequencer = PipelineSequencer::standard(
//!     config,
//!     layout,
//!     scheduler,
//!     Arc::new(LoggingEventSink::default()),
//!     SequencerOptions::default(),
//! );
//! let report = sequencer.run(&CancellationToken::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod checks;
pub mod config;
pub mod core;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod janitor;
pub mod matrix;
pub mod pipeline;
pub mod scheduler;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::checks::{QualityCheck, QualityWarning, SanityCheck};
    pub use crate::config::{Aligner, DataLayout, GenomeLayout, PipelineConfig, StageSettings};
    pub use crate::core::{JobHandle, JobSpec, Sample, StageKind, StageResult, StageState, WorkUnit};
    pub use crate::discovery::{NamingConvention, OrphanPolicy, WorkUnitResolver};
    pub use crate::errors::SeqflowError;
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::janitor::{ArtifactJanitor, CleanupReport};
    pub use crate::matrix::{ExpressionMatrix, MatrixTransform};
    pub use crate::pipeline::{PipelineReport, PipelineSequencer, SequencerOptions, VerifyPolicy};
    pub use crate::scheduler::{GridEngineClient, PollStatus, SchedulerClient};
    pub use crate::stages::{PollPolicy, StageDefinition, StageRunner};
    pub use crate::utils::Timestamp;
}
