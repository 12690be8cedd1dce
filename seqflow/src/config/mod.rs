//! Immutable pipeline configuration.
//!
//! Two TOML files drive a run:
//! - the pipeline settings ([`PipelineConfig`]): scheduler commands, per
//!   stage submission settings, aligner choice and engine policies;
//! - the dataset layout ([`DataLayout`]): per-genome input files and the
//!   output directory for each pipeline role.
//!
//! Both are loaded once and passed by reference into every component; no
//! component reads configuration from anywhere else.

mod layout;
mod settings;

pub use layout::{DataLayout, GenomeLayout};
pub use settings::{Aligner, PipelineConfig, SchedulerSettings, StageSettings};

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::errors::ConfigError;

/// Reads and deserializes a TOML file.
pub(crate) fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
