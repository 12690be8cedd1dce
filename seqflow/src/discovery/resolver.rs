//! Directory scanning and pair grouping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::NamingConvention;
use crate::core::Sample;
use crate::errors::DiscoveryError;

/// What to do with a forward file whose partner is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Emit it as a single-end unit and log a warning.
    #[default]
    DegradeToSingle,
    /// Leave it out and log a warning.
    Drop,
}

/// Groups the files of a directory into samples.
#[derive(Debug, Clone)]
pub struct WorkUnitResolver {
    convention: NamingConvention,
    orphans: OrphanPolicy,
}

impl WorkUnitResolver {
    /// Creates a resolver for a naming convention.
    #[must_use]
    pub fn new(convention: NamingConvention) -> Self {
        Self {
            convention,
            orphans: OrphanPolicy::default(),
        }
    }

    /// Sets the orphan policy.
    #[must_use]
    pub fn with_orphan_policy(mut self, orphans: OrphanPolicy) -> Self {
        self.orphans = orphans;
        self
    }

    /// Returns the naming convention.
    #[must_use]
    pub fn convention(&self) -> &NamingConvention {
        &self.convention
    }

    /// Lists `dir` and returns its samples in file name order.
    ///
    /// Only the listing happens here; grouping is done as the iterator is
    /// consumed. Resolving an unchanged directory again yields the same
    /// sequence.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Io` if the directory cannot be listed.
    pub fn resolve(&self, dir: &Path) -> Result<WorkUnits, DiscoveryError> {
        let io_err = |source| DiscoveryError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files = BTreeSet::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                debug!(path = %path.display(), "Ignoring file with non UTF-8 name");
                continue;
            };
            if self.convention.accepts(&name) {
                files.insert(name);
            } else {
                debug!(dir = %dir.display(), file = %name, "File does not match naming convention");
            }
        }

        info!(dir = %dir.display(), files = files.len(), "Resolved input files");

        Ok(WorkUnits {
            dir: dir.to_path_buf(),
            convention: self.convention.clone(),
            orphans: self.orphans,
            files,
        })
    }
}

/// Lazy iterator over the samples of one directory.
#[derive(Debug, Clone)]
pub struct WorkUnits {
    dir: PathBuf,
    convention: NamingConvention,
    orphans: OrphanPolicy,
    files: BTreeSet<String>,
}

impl WorkUnits {
    /// Returns the directory being resolved.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Iterator for WorkUnits {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        loop {
            let name = self.files.pop_first()?;

            let Some((id, partner)) = self.convention.split_pair(&name) else {
                let id = self.convention.single_id(&name);
                return Some(Sample::single(id, self.dir.join(name)));
            };

            if self.files.remove(&partner) {
                return Some(Sample::paired(id, self.dir.join(&name), self.dir.join(partner)));
            }

            match self.orphans {
                OrphanPolicy::DegradeToSingle => {
                    warn!(file = %name, partner = %partner, "Partner file missing, treating as single-end");
                    let id = self.convention.single_id(&name);
                    return Some(Sample::single(id, self.dir.join(name)));
                }
                OrphanPolicy::Drop => {
                    warn!(file = %name, partner = %partner, "Partner file missing, dropping");
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.files.len()))
    }
}
