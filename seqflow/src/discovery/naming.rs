//! File naming conventions.

use serde::{Deserialize, Serialize};

/// How sample files are named in one pipeline location.
///
/// A file belongs to the convention when its name ends in one of the
/// recognized suffixes and in none of the excluded ones. Paired files
/// differ only in the pair marker: the forward file carries the left
/// marker and its partner the right marker at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConvention {
    recognized: Vec<String>,
    excluded: Vec<String>,
    left_marker: String,
    right_marker: String,
}

impl NamingConvention {
    /// Creates a convention with the default `_1.` / `_2.` pair markers.
    #[must_use]
    pub fn new<I, S>(recognized: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recognized: recognized.into_iter().map(Into::into).collect(),
            excluded: Vec::new(),
            left_marker: "_1.".to_string(),
            right_marker: "_2.".to_string(),
        }
    }

    /// Raw reads straight off the sequencer.
    #[must_use]
    pub fn raw_reads() -> Self {
        Self::new([".fq.gz", ".fastq.gz"])
    }

    /// Reads written by the trimming stage.
    #[must_use]
    pub fn trimmed_reads() -> Self {
        Self::new([
            ".trimmed.paired.fq.gz",
            ".trimmed.paired.fastq.gz",
            ".trimmed.fq.gz",
            ".trimmed.fastq.gz",
        ])
        .with_excluded([".unpaired.fq.gz", ".unpaired.fastq.gz"])
    }

    /// HISAT2 alignments.
    #[must_use]
    pub fn sam() -> Self {
        Self::new([".sam"])
    }

    /// htseq-count tables.
    #[must_use]
    pub fn htseq() -> Self {
        Self::new([".htseq"])
    }

    /// Adds excluded suffixes.
    #[must_use]
    pub fn with_excluded<I, S>(mut self, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(excluded.into_iter().map(Into::into));
        self
    }

    /// Replaces the pair markers.
    #[must_use]
    pub fn with_markers(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_marker = left.into();
        self.right_marker = right.into();
        self
    }

    /// Returns the left (forward) pair marker.
    #[must_use]
    pub fn left_marker(&self) -> &str {
        &self.left_marker
    }

    /// Returns the right (reverse) pair marker.
    #[must_use]
    pub fn right_marker(&self) -> &str {
        &self.right_marker
    }

    /// Returns true if the file name belongs to this convention.
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        self.recognized.iter().any(|s| name.ends_with(s.as_str()))
            && !self.excluded.iter().any(|s| name.ends_with(s.as_str()))
    }

    /// Returns the longest recognized suffix of `name`.
    #[must_use]
    pub fn suffix_of(&self, name: &str) -> Option<&str> {
        self.recognized
            .iter()
            .filter(|s| name.ends_with(s.as_str()))
            .max_by_key(|s| s.len())
            .map(String::as_str)
    }

    /// Returns the single-end sample id: the name minus its longest
    /// recognized suffix.
    #[must_use]
    pub fn single_id(&self, name: &str) -> String {
        match self.suffix_of(name) {
            Some(suffix) => name[..name.len() - suffix.len()].to_string(),
            None => name.to_string(),
        }
    }

    /// Returns the paired sample id and partner name for a forward file.
    ///
    /// `None` if the name does not carry the left marker.
    #[must_use]
    pub fn split_pair(&self, name: &str) -> Option<(String, String)> {
        let at = name.find(self.left_marker.as_str())?;
        let id = name[..at].to_string();
        let partner = format!(
            "{}{}{}",
            &name[..at],
            self.right_marker,
            &name[at + self.left_marker.len()..]
        );
        Some((id, partner))
    }

    /// Rewrites the recognized suffix of `name` into `replacement`.
    ///
    /// Used to derive output names, e.g. `A_1.fq.gz` into
    /// `A_1.trimmed.paired.fq.gz`. The extension after the first `.` of the
    /// matched suffix is preserved when `replacement` contains `{ext}`.
    #[must_use]
    pub fn rewrite_suffix(&self, name: &str, replacement: &str) -> String {
        let suffix = self.suffix_of(name).unwrap_or("");
        let stem = &name[..name.len() - suffix.len()];
        let ext = suffix.trim_start_matches('.');
        format!("{stem}{}", replacement.replace("{ext}", ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_accepts_recognized_suffixes() {
        let raw = NamingConvention::raw_reads();
        assert!(raw.accepts("A_1.fq.gz"));
        assert!(raw.accepts("B.fastq.gz"));
        assert!(!raw.accepts("notes.txt"));
        assert!(!raw.accepts("A_1.fq"));
    }

    #[test]
    fn test_trimmed_excludes_unpaired() {
        let trimmed = NamingConvention::trimmed_reads();
        assert!(trimmed.accepts("A_1.trimmed.paired.fq.gz"));
        assert!(trimmed.accepts("B.trimmed.fastq.gz"));
        assert!(!trimmed.accepts("A_1.trimmed.unpaired.fq.gz"));
    }

    #[test]
    fn test_single_id_uses_longest_suffix() {
        let trimmed = NamingConvention::trimmed_reads();
        assert_eq!(trimmed.single_id("B.trimmed.fq.gz"), "B");
        assert_eq!(trimmed.single_id("C.trimmed.paired.fq.gz"), "C");

        let raw = NamingConvention::raw_reads();
        assert_eq!(raw.single_id("X_1.fq.gz"), "X_1");
    }

    #[test]
    fn test_split_pair() {
        let raw = NamingConvention::raw_reads();
        assert_eq!(
            raw.split_pair("A_1.fq.gz"),
            Some(("A".to_string(), "A_2.fq.gz".to_string()))
        );
        assert_eq!(raw.split_pair("B.fq.gz"), None);

        let trimmed = NamingConvention::trimmed_reads();
        assert_eq!(
            trimmed.split_pair("A_1.trimmed.paired.fq.gz"),
            Some(("A".to_string(), "A_2.trimmed.paired.fq.gz".to_string()))
        );
    }

    #[test]
    fn test_custom_markers() {
        let convention = NamingConvention::new([".fq"]).with_markers("_R1.", "_R2.");
        assert_eq!(
            convention.split_pair("S_R1.fq"),
            Some(("S".to_string(), "S_R2.fq".to_string()))
        );
    }

    #[test]
    fn test_rewrite_suffix() {
        let raw = NamingConvention::raw_reads();
        assert_eq!(
            raw.rewrite_suffix("A_1.fastq.gz", ".trimmed.paired.{ext}"),
            "A_1.trimmed.paired.fastq.gz"
        );
        assert_eq!(raw.rewrite_suffix("B.fq.gz", ".trimmed.{ext}"), "B.trimmed.fq.gz");
    }
}
