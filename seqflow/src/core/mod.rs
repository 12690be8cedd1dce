//! Core domain model types for seqflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage lifecycle state and kind
//! - Samples and work units
//! - Job specs, job groups and scheduler handles
//! - Stage results

mod job;
mod result;
mod sample;
mod status;

pub use job::{JobGroup, JobHandle, JobSpec, JobSpecBuilder, TemplateRef};
pub use result::{RejectedUnit, SkippedUnit, StageResult};
pub use sample::{ReadMode, Sample, SampleFiles, WorkUnit};
pub use status::{StageKind, StageState};
