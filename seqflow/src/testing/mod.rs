//! Testing utilities for seqflow pipelines.
//!
//! This module provides:
//! - An in-memory scheduler that records submissions
//! - Dataset layout fixtures

mod fixtures;
mod mocks;

pub use fixtures::genome_layout;
#[cfg(test)]
pub use fixtures::TempDataset;
pub use mocks::MockScheduler;
