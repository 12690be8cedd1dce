//! Per-sample quality checks on aligner and counter statistics.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::utils::{format_iso8601, now_utc};

static HISAT2_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+(?:\.[0-9]+)?)% overall alignment rate").expect("HISAT2_RATE regex is valid")
});

static TOPHAT_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+(?:\.[0-9]+)?)% overall read mapping rate").expect("TOPHAT_RATE regex is valid")
});

/// The outcome of one quality check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVerdict {
    /// Whether the sample met the cutoff.
    pub passed: bool,
    /// The measured percentage, if the statistics could be read.
    pub value: Option<f64>,
    /// Human readable statistics.
    pub detail: String,
}

impl QualityVerdict {
    fn measured(value: f64, cutoff: u32, detail: String) -> Self {
        Self {
            passed: value >= f64::from(cutoff),
            value: Some(value),
            detail,
        }
    }

    fn unreadable(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            value: None,
            detail: detail.into(),
        }
    }
}

/// Judges one statistics file against a percentage cutoff.
pub trait QualityCheck: Send + Sync {
    /// Returns the name of the check.
    fn name(&self) -> &str;

    /// Checks the statistics file at `path`.
    ///
    /// Only IO failures are errors; unreadable statistics fail the check.
    fn check(&self, path: &Path, cutoff: u32) -> io::Result<QualityVerdict>;
}

fn rate_check(pattern: &Regex, path: &Path, cutoff: u32, what: &str) -> io::Result<QualityVerdict> {
    let content = fs::read_to_string(path)?;
    let verdict = pattern
        .captures(&content)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map_or_else(
            || QualityVerdict::unreadable(format!("no {what} reported")),
            |rate| QualityVerdict::measured(rate, cutoff, format!("{rate:.2}% {what} (cutoff {cutoff}%)")),
        );
    Ok(verdict)
}

/// Reads the `% overall alignment rate` line of a HISAT2 summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hisat2Quality;

impl QualityCheck for Hisat2Quality {
    fn name(&self) -> &str {
        "hisat2"
    }

    fn check(&self, path: &Path, cutoff: u32) -> io::Result<QualityVerdict> {
        rate_check(&HISAT2_RATE, path, cutoff, "overall alignment rate")
    }
}

/// Reads the `overall read mapping rate` line of a TopHat `align_summary.txt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TophatQuality;

impl QualityCheck for TophatQuality {
    fn name(&self) -> &str {
        "tophat"
    }

    fn check(&self, path: &Path, cutoff: u32) -> io::Result<QualityVerdict> {
        rate_check(&TOPHAT_RATE, path, cutoff, "overall read mapping rate")
    }
}

/// Computes the share of reads htseq-count assigned to a feature.
///
/// Rows starting with `__` are the counter's own categories (no feature,
/// ambiguous, too low quality, not aligned, not unique); every other row is
/// a gene.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtseqQuality;

impl QualityCheck for HtseqQuality {
    fn name(&self) -> &str {
        "htseq"
    }

    fn check(&self, path: &Path, cutoff: u32) -> io::Result<QualityVerdict> {
        let content = fs::read_to_string(path)?;
        let mut assigned = 0u64;
        let mut unassigned = 0u64;

        for line in content.lines() {
            let mut fields = line.split('\t').filter(|f| !f.is_empty());
            let (Some(name), Some(count)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Ok(count) = count.trim().parse::<u64>() else {
                continue;
            };
            if name.starts_with("__") {
                unassigned += count;
            } else {
                assigned += count;
            }
        }

        let total = assigned + unassigned;
        if total == 0 {
            return Ok(QualityVerdict::unreadable("no reads counted"));
        }

        #[allow(clippy::cast_precision_loss)]
        let rate = assigned as f64 * 100.0 / total as f64;
        Ok(QualityVerdict::measured(
            rate,
            cutoff,
            format!("{assigned} of {total} reads assigned ({rate:.2}%, cutoff {cutoff}%)"),
        ))
    }
}

/// A sample that failed its quality cutoff.
///
/// Quality warnings are values: they are logged and reported, and the
/// pipeline carries on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityWarning {
    /// The check that failed.
    pub check: String,
    /// The genome the sample belongs to.
    pub genome: String,
    /// The statistics file.
    pub path: PathBuf,
    /// The cutoff applied.
    pub cutoff: u32,
    /// The verdict.
    pub verdict: QualityVerdict,
}

impl QualityWarning {
    /// Creates a new warning.
    #[must_use]
    pub fn new(
        check: impl Into<String>,
        genome: impl Into<String>,
        path: impl Into<PathBuf>,
        cutoff: u32,
        verdict: QualityVerdict,
    ) -> Self {
        Self {
            check: check.into(),
            genome: genome.into(),
            path: path.into(),
            cutoff,
            verdict,
        }
    }

    /// Logs the warning.
    pub fn report(&self) {
        warn!(
            check = %self.check,
            genome = %self.genome,
            path = %self.path.display(),
            detail = %self.verdict.detail,
            "Sample with insufficient quality detected"
        );
    }
}

/// Append-only quality log.
///
/// Every checked sample becomes one tab separated line. A disabled log
/// accepts records and writes nothing.
#[derive(Debug, Clone)]
pub struct QualityLog {
    path: PathBuf,
    enabled: bool,
}

impl QualityLog {
    /// Creates a log writing to `path` when `enabled`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
        }
    }

    /// Creates a log that never writes.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    /// Returns the log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if records are written.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Appends one record.
    pub fn record(&self, check: &str, path: &Path, verdict: &QualityVerdict) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}",
            format_iso8601(&now_utc()),
            check,
            path.display(),
            if verdict.passed { "PASS" } else { "FAIL" },
            verdict.detail,
        )?;
        Ok(())
    }
}
