//! Job specifications and scheduler handles.
//!
//! A [`JobSpec`] is the immutable description of one scheduler job: which
//! submission script to run, which named values to pass to it and which
//! files it is expected to produce. Specs are only created through
//! [`JobSpecBuilder`], which checks the bindings against the template so
//! that a missing or unserializable value is caught before anything is
//! submitted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::JobSpecError;

/// The logical name shared by every job of one stage invocation.
///
/// Grid Engine reports it as the "full jobname", which is how the barrier
/// finds the group's jobs and how the janitor finds their log files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobGroup(String);

impl JobGroup {
    /// Creates a job group name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a rendered submission script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Variant name within the stage (e.g. "single", "paired").
    pub variant: String,
    /// Path of the generated script.
    pub script: PathBuf,
    /// Binding keys the script reads.
    pub required: Vec<String>,
}

impl TemplateRef {
    /// Creates a template reference.
    #[must_use]
    pub fn new(variant: impl Into<String>, script: impl Into<PathBuf>, required: Vec<String>) -> Self {
        Self {
            variant: variant.into(),
            script: script.into(),
            required,
        }
    }
}

/// Immutable description of one scheduler job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    stage: String,
    slot: usize,
    unit: String,
    group: JobGroup,
    template: TemplateRef,
    bindings: Vec<(String, String)>,
    outputs: Vec<PathBuf>,
}

impl JobSpec {
    /// Starts building a job spec.
    #[must_use]
    pub fn builder(stage: impl Into<String>, group: JobGroup, template: TemplateRef) -> JobSpecBuilder {
        JobSpecBuilder::new(stage, group, template)
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the job slot number within the stage invocation (1-based).
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Returns the unit label.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Returns the job group.
    #[must_use]
    pub fn group(&self) -> &JobGroup {
        &self.group
    }

    /// Returns the template reference.
    #[must_use]
    pub fn template(&self) -> &TemplateRef {
        &self.template
    }

    /// Returns the bindings in insertion order.
    #[must_use]
    pub fn bindings(&self) -> &[(String, String)] {
        &self.bindings
    }

    /// Looks up a binding by key.
    #[must_use]
    pub fn binding(&self, key: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the declared outputs.
    #[must_use]
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    /// Serializes the bindings as `key1=value1,key2=value2`.
    #[must_use]
    pub fn serialized_bindings(&self) -> String {
        self.bindings
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Builder for [`JobSpec`].
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    stage: String,
    slot: usize,
    unit: String,
    group: JobGroup,
    template: TemplateRef,
    bindings: Vec<(String, String)>,
    outputs: Vec<PathBuf>,
    errors: Vec<JobSpecError>,
}

impl JobSpecBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(stage: impl Into<String>, group: JobGroup, template: TemplateRef) -> Self {
        Self {
            stage: stage.into(),
            slot: 1,
            unit: String::new(),
            group,
            template,
            bindings: Vec::new(),
            outputs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Sets the job slot number.
    #[must_use]
    pub fn slot(mut self, slot: usize) -> Self {
        self.slot = slot;
        self
    }

    /// Sets the unit label.
    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Adds a string binding.
    #[must_use]
    pub fn bind(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.push((key.into(), value.into()));
        self
    }

    /// Adds a path binding. Non UTF-8 paths are rejected at build time.
    #[must_use]
    pub fn bind_path(mut self, key: impl Into<String>, path: &Path) -> Self {
        let key = key.into();
        match path.to_str() {
            Some(value) => self.bindings.push((key, value.to_string())),
            None => self.errors.push(JobSpecError::InvalidBinding {
                key,
                value: path.to_string_lossy().into_owned(),
                reason: "path is not valid UTF-8".to_string(),
            }),
        }
        self
    }

    /// Adds several bindings at once.
    #[must_use]
    pub fn bind_all<I, K, V>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.bindings
            .extend(bindings.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Declares an expected output.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    /// Validates and builds the job spec.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: an unserializable value, an invalid
    /// or duplicated key, or a binding the template requires but was not
    /// supplied.
    pub fn build(mut self) -> Result<JobSpec, JobSpecError> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }

        let mut seen = HashSet::new();
        for (key, value) in &self.bindings {
            validate_binding(key, value)?;
            if !seen.insert(key.as_str()) {
                return Err(JobSpecError::DuplicateBinding { key: key.clone() });
            }
        }

        if let Some(key) = self
            .template
            .required
            .iter()
            .find(|key| !seen.contains(key.as_str()))
        {
            return Err(JobSpecError::MissingBinding {
                template: self.template.variant.clone(),
                key: key.clone(),
            });
        }

        Ok(JobSpec {
            stage: self.stage,
            slot: self.slot,
            unit: self.unit,
            group: self.group,
            template: self.template,
            bindings: self.bindings,
            outputs: self.outputs,
        })
    }
}

fn validate_binding(key: &str, value: &str) -> Result<(), JobSpecError> {
    let invalid = |reason: &str| JobSpecError::InvalidBinding {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = key.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("key must be a shell variable name"));
    }
    if value.contains(',') {
        return Err(invalid("value must not contain ','"));
    }
    if value.contains(['\n', '\r']) {
        return Err(invalid("value must not contain line breaks"));
    }
    Ok(())
}

/// Handle returned by the scheduler for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Scheduler-assigned job id.
    pub id: String,
    /// The job group the job belongs to.
    pub group: JobGroup,
    /// The unit label.
    pub unit: String,
}

impl JobHandle {
    /// Creates a new handle.
    #[must_use]
    pub fn new(id: impl Into<String>, group: JobGroup, unit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group,
            unit: unit.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template(required: &[&str]) -> TemplateRef {
        TemplateRef::new(
            "paired",
            "/scratch/trimmomatic_pe_7.sh",
            required.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    #[test]
    fn test_build_valid_spec() {
        let spec = JobSpec::builder("trim_fastq", JobGroup::new("trimmomatic_7"), template(&["ina", "inb"]))
            .slot(2)
            .unit("zma:A")
            .bind("ina", "/data/A_1.fq.gz")
            .bind_path("inb", Path::new("/data/A_2.fq.gz"))
            .output("/trimmed/A_1.trimmed.paired.fq.gz")
            .build()
            .unwrap();

        assert_eq!(spec.slot(), 2);
        assert_eq!(spec.unit(), "zma:A");
        assert_eq!(spec.binding("inb"), Some("/data/A_2.fq.gz"));
        assert_eq!(spec.serialized_bindings(), "ina=/data/A_1.fq.gz,inb=/data/A_2.fq.gz");
        assert_eq!(spec.outputs().len(), 1);
    }

    #[test]
    fn test_missing_required_binding() {
        let err = JobSpec::builder("trim_fastq", JobGroup::new("g"), template(&["ina", "inb"]))
            .bind("ina", "x")
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            JobSpecError::MissingBinding {
                template: "paired".to_string(),
                key: "inb".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_binding() {
        let err = JobSpec::builder("s", JobGroup::new("g"), template(&[]))
            .bind("out", "a")
            .bind("out", "b")
            .build()
            .unwrap_err();
        assert_eq!(err, JobSpecError::DuplicateBinding { key: "out".to_string() });
    }

    #[test]
    fn test_value_with_comma_rejected() {
        let err = JobSpec::builder("s", JobGroup::new("g"), template(&[]))
            .bind("in", "a,b")
            .build()
            .unwrap_err();
        assert!(matches!(err, JobSpecError::InvalidBinding { ref key, .. } if key == "in"));
    }

    #[test]
    fn test_bad_key_rejected() {
        let err = JobSpec::builder("s", JobGroup::new("g"), template(&[]))
            .bind("1in", "a")
            .build()
            .unwrap_err();
        assert!(matches!(err, JobSpecError::InvalidBinding { .. }));
    }

    #[test]
    fn test_bind_all_keeps_order() {
        let spec = JobSpec::builder("s", JobGroup::new("g"), template(&[]))
            .bind_all([("b", "2"), ("a", "1")])
            .build()
            .unwrap();
        assert_eq!(spec.serialized_bindings(), "b=2,a=1");
    }
}
