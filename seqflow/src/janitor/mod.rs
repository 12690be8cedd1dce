//! Post-stage cleanup of intermediate files and scheduler logs.
//!
//! Cleanup is best effort: paths that are already gone are not an error,
//! and a path that cannot be removed is logged and reported without
//! stopping the pipeline. Running cleanup twice is therefore harmless.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::{JobGroup, StageResult};

/// What a cleanup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// True if cleanup was skipped because intermediates are retained.
    pub retained: bool,
    /// Paths removed.
    pub removed: Vec<PathBuf>,
    /// Paths that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    /// Returns true if every removal succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Removes transient paths and the job group's log files.
#[derive(Debug, Clone)]
pub struct ArtifactJanitor {
    log_dir: PathBuf,
}

impl ArtifactJanitor {
    /// Creates a janitor for the scheduler log directory.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    /// Returns the log directory.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Cleans up after a stage unless `retain` is set.
    pub fn cleanup(&self, result: &StageResult, retain: bool) -> CleanupReport {
        if retain {
            debug!(stage = %result.stage, "Keeping intermediate files");
            return CleanupReport {
                retained: true,
                ..CleanupReport::default()
            };
        }

        let mut report = CleanupReport::default();
        for path in &result.transient {
            remove_path(path, &mut report);
        }
        if let Some(group) = &result.group {
            for path in self.log_artifacts(group) {
                remove_path(&path, &mut report);
            }
        }

        info!(
            stage = %result.stage,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Cleaned up stage artifacts"
        );
        report
    }

    /// Lists the scheduler log files of a job group.
    #[must_use]
    pub fn log_artifacts(&self, group: &JobGroup) -> Vec<PathBuf> {
        let Some(dir) = self.log_dir.to_str() else {
            warn!(dir = %self.log_dir.display(), "Log directory is not valid UTF-8, skipping log cleanup");
            return Vec::new();
        };
        let dir = glob::Pattern::escape(dir);
        let group = glob::Pattern::escape(group.as_str());

        let mut found = Vec::new();
        for pattern in [
            format!("{group}.o*"),
            format!("{group}.e*"),
            format!("{group}.po*"),
            format!("{group}.pe*"),
            format!("OUT_{group}.*"),
        ] {
            let full = format!("{dir}/{pattern}");
            match glob::glob(&full) {
                Ok(paths) => found.extend(paths.filter_map(Result::ok)),
                Err(e) => warn!(pattern = %full, error = %e, "Invalid log pattern"),
            }
        }
        found.sort();
        found.dedup();
        found
    }
}

fn remove_path(path: &Path, report: &mut CleanupReport) {
    let removal = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };

    match removal {
        Ok(()) => {
            debug!(path = %path.display(), "Removed");
            report.removed.push(path.to_path_buf());
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not remove");
            report.failed.push((path.to_path_buf(), e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result_with(transient: Vec<PathBuf>, group: Option<&str>) -> StageResult {
        let mut result = StageResult::new("align");
        result.transient = transient;
        result.group = group.map(JobGroup::new);
        result
    }

    #[test]
    fn test_removes_transient_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("A_1.trimmed.paired.fq.gz");
        let tmp = dir.path().join("tmp");
        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir_all(tmp.join("nested")).unwrap();
        std::fs::write(tmp.join("nested").join("chunk"), "x").unwrap();

        let janitor = ArtifactJanitor::new(dir.path());
        let report = janitor.cleanup(&result_with(vec![file.clone(), tmp.clone()], None), false);

        assert!(!file.exists());
        assert!(!tmp.exists());
        assert_eq!(report.removed.len(), 2);
        assert!(report.is_complete());
    }

    #[test]
    fn test_cleanup_twice_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("A.sam");
        std::fs::write(&file, "x").unwrap();

        let janitor = ArtifactJanitor::new(dir.path());
        let result = result_with(vec![file], Some("htseq_count_5"));

        let first = janitor.cleanup(&result, false);
        let second = janitor.cleanup(&result, false);
        assert_eq!(first.removed.len(), 1);
        assert!(second.removed.is_empty());
        assert!(second.is_complete());
    }

    #[test]
    fn test_retain_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("A.sam");
        let log = dir.path().join("hisat2_3.o812345");
        std::fs::write(&file, "x").unwrap();
        std::fs::write(&log, "x").unwrap();

        let janitor = ArtifactJanitor::new(dir.path());
        let report = janitor.cleanup(&result_with(vec![file.clone()], Some("hisat2_3")), true);

        assert!(report.retained);
        assert!(file.exists());
        assert!(log.exists());
    }

    #[test]
    fn test_log_artifacts_match_only_the_group() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "hisat2_3.o812345",
            "hisat2_3.e812345",
            "hisat2_3.po812345",
            "hisat2_3.pe812345",
            "OUT_hisat2_3.txt",
            "hisat2_4.o812399",
            "hisat2_31.o812400",
            "OUT_hisat2_31.txt",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let janitor = ArtifactJanitor::new(dir.path());
        let found: Vec<_> = janitor
            .log_artifacts(&JobGroup::new("hisat2_3"))
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            found,
            vec![
                "OUT_hisat2_3.txt",
                "hisat2_3.e812345",
                "hisat2_3.o812345",
                "hisat2_3.pe812345",
                "hisat2_3.po812345",
            ]
        );

        let report = janitor.cleanup(&result_with(Vec::new(), Some("hisat2_3")), false);
        assert_eq!(report.removed.len(), 5);
        assert!(dir.path().join("hisat2_4.o812399").exists());
        assert!(dir.path().join("hisat2_31.o812400").exists());
        assert!(dir.path().join("OUT_hisat2_31.txt").exists());
    }
}
