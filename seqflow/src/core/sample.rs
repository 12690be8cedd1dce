//! Samples and work units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Whether a sample was sequenced from one end or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// One read file.
    SingleEnd,
    /// A forward and a reverse read file.
    PairedEnd,
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleEnd => write!(f, "single-end"),
            Self::PairedEnd => write!(f, "paired-end"),
        }
    }
}

/// The files backing a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SampleFiles {
    /// A single file.
    Single {
        /// The file path.
        path: PathBuf,
    },
    /// An ordered forward/reverse pair.
    Paired {
        /// The forward (`_1`) file.
        forward: PathBuf,
        /// The reverse (`_2`) file.
        reverse: PathBuf,
    },
}

/// A logical sample discovered from file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    id: String,
    files: SampleFiles,
}

impl Sample {
    /// Creates a single-end sample.
    #[must_use]
    pub fn single(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            files: SampleFiles::Single { path: path.into() },
        }
    }

    /// Creates a paired-end sample.
    #[must_use]
    pub fn paired(id: impl Into<String>, forward: impl Into<PathBuf>, reverse: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            files: SampleFiles::Paired {
                forward: forward.into(),
                reverse: reverse.into(),
            },
        }
    }

    /// Returns the sample identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the read mode.
    #[must_use]
    pub fn mode(&self) -> ReadMode {
        match self.files {
            SampleFiles::Single { .. } => ReadMode::SingleEnd,
            SampleFiles::Paired { .. } => ReadMode::PairedEnd,
        }
    }

    /// Returns the backing files.
    #[must_use]
    pub fn files(&self) -> &SampleFiles {
        &self.files
    }

    /// Returns every backing file, forward first.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        match &self.files {
            SampleFiles::Single { path } => vec![path.as_path()],
            SampleFiles::Paired { forward, reverse } => vec![forward.as_path(), reverse.as_path()],
        }
    }
}

/// A sample scheduled within one genome of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    genome: String,
    sample: Sample,
}

impl WorkUnit {
    /// Creates a work unit.
    #[must_use]
    pub fn new(genome: impl Into<String>, sample: Sample) -> Self {
        Self {
            genome: genome.into(),
            sample,
        }
    }

    /// Creates a genome-level unit whose single input is `path`.
    #[must_use]
    pub fn genome_level(genome: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let genome = genome.into();
        Self {
            sample: Sample::single(genome.clone(), path),
            genome,
        }
    }

    /// Returns the genome this unit belongs to.
    #[must_use]
    pub fn genome(&self) -> &str {
        &self.genome
    }

    /// Returns the sample.
    #[must_use]
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    /// Returns a label unique across the dataset, e.g. `zma:SRR1`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}", self.genome, self.sample.id())
    }
}
