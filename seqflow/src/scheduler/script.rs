//! Submission script generation.
//!
//! Each stage invocation gets one job group name, derived from the stage's
//! name pattern by replacing `%d` with a random number, and one script per
//! template variant. The script reads its inputs from variables passed with
//! `qsub -v`, so the variables a command uses (`${name}`) are exactly the
//! bindings its job specs must supply.

use rand::Rng;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

use crate::core::{JobGroup, TemplateRef};
use crate::errors::ScriptError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("PLACEHOLDER regex is valid")
});

/// A command template for one stage variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTemplate {
    /// Variant name ("single", "paired", ...).
    pub variant: String,
    /// Script file name pattern containing `%d`.
    pub file_pattern: String,
    /// Shell command run by the job.
    pub command: String,
    /// Number of array tasks, for array jobs.
    pub array_size: Option<usize>,
    /// Binding keys every plan of this variant supplies.
    pub provided: Vec<String>,
}

impl StageTemplate {
    /// Creates a plain (non-array) template.
    #[must_use]
    pub fn new(variant: impl Into<String>, file_pattern: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            file_pattern: file_pattern.into(),
            command: command.into(),
            array_size: None,
            provided: Vec::new(),
        }
    }

    /// Declares the binding keys every plan of this variant supplies.
    #[must_use]
    pub fn providing<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provided = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the keys the command reads that plans do not supply.
    #[must_use]
    pub fn unbound(&self) -> Vec<String> {
        required_bindings(&self.command)
            .into_iter()
            .filter(|key| !self.provided.contains(key))
            .collect()
    }

    /// Turns the template into an array job with `size` tasks.
    #[must_use]
    pub fn with_array(mut self, size: usize) -> Self {
        self.array_size = Some(size);
        self
    }

    /// Replaces the command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }
}

/// Returns the binding keys a command reads, in first-use order.
///
/// Upper-case names are environment variables provided by the scheduler
/// (`SGE_TASK_ID`, `TMPDIR`, ...) and are not bindings.
#[must_use]
pub fn required_bindings(command: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for capture in PLACEHOLDER.captures_iter(command) {
        let key = &capture[1];
        if key.chars().all(|c| !c.is_ascii_lowercase()) {
            continue;
        }
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Replaces `%d` in a pattern with `number`.
#[must_use]
pub fn job_group_name(pattern: &str, number: u32) -> String {
    pattern.replace("%d", &number.to_string())
}

/// Renders the text of a submission script.
#[must_use]
pub fn render_script(group: &JobGroup, template: &StageTemplate, modules: &[String]) -> String {
    let mut script = String::from("#!/bin/bash\n");
    script.push_str(&format!("#$ -N {group}\n"));
    script.push_str("#$ -cwd\n");
    if let Some(size) = template.array_size {
        script.push_str(&format!("#$ -t 1-{size}\n"));
    }
    script.push('\n');
    if !modules.is_empty() {
        script.push_str(&format!("module load {}\n", modules.join(" ")));
    }
    script.push_str(template.command.trim_end());
    script.push('\n');
    script
}

/// The scripts written for one stage invocation.
#[derive(Debug, Clone)]
pub struct ScriptSet {
    group: JobGroup,
    scripts: BTreeMap<String, TemplateRef>,
}

impl ScriptSet {
    /// Writes one script per template into `scratch_dir` under a fresh job
    /// group name.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError` if a script cannot be written.
    pub fn write(
        group_pattern: &str,
        templates: &[StageTemplate],
        modules: &[String],
        scratch_dir: &Path,
    ) -> Result<Self, ScriptError> {
        let number = rand::thread_rng().gen_range(1..1_000_000);
        Self::write_numbered(group_pattern, number, templates, modules, scratch_dir)
    }

    /// Like [`ScriptSet::write`] with a fixed number.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError` if a script cannot be written.
    pub fn write_numbered(
        group_pattern: &str,
        number: u32,
        templates: &[StageTemplate],
        modules: &[String],
        scratch_dir: &Path,
    ) -> Result<Self, ScriptError> {
        let scratch_dir = absolute(scratch_dir)?;
        std::fs::create_dir_all(&scratch_dir).map_err(|source| ScriptError {
            path: scratch_dir.clone(),
            source,
        })?;

        let group = JobGroup::new(job_group_name(group_pattern, number));
        let mut scripts = BTreeMap::new();

        for template in templates {
            let path = scratch_dir.join(job_group_name(&template.file_pattern, number));
            let text = render_script(&group, template, modules);
            std::fs::write(&path, text).map_err(|source| ScriptError {
                path: path.clone(),
                source,
            })?;
            debug!(group = %group, script = %path.display(), "Wrote submission script");

            scripts.insert(
                template.variant.clone(),
                TemplateRef::new(template.variant.clone(), path, required_bindings(&template.command)),
            );
        }

        Ok(Self { group, scripts })
    }

    /// Returns the job group.
    #[must_use]
    pub fn group(&self) -> &JobGroup {
        &self.group
    }

    /// Returns the script for a variant.
    #[must_use]
    pub fn template(&self, variant: &str) -> Option<&TemplateRef> {
        self.scripts.get(variant)
    }

    /// Returns every script path.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.scripts.values().map(|t| t.script.as_path()).collect()
    }

    /// Removes the scripts. Scripts already gone are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError` for any other removal failure.
    pub fn remove(&self) -> Result<(), ScriptError> {
        for template in self.scripts.values() {
            match std::fs::remove_file(&template.script) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ScriptError {
                        path: template.script.clone(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ScriptError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| ScriptError {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unbound_skips_provided_and_environment_keys() {
        let template = StageTemplate::new(
            "default",
            "interproscan_%d.sh",
            "interproscan.sh -i ${in_dir}/chunk${SGE_TASK_ID} -appl ${appl}",
        )
        .providing(["in_dir"]);
        assert_eq!(template.unbound(), vec!["appl".to_string()]);
        assert_eq!(template.clone().providing(["in_dir", "appl"]).unbound(), Vec::<String>::new());
    }

    #[test]
    fn test_required_bindings() {
        let command = "hisat2 -x ${genome} -1 ${forward} -2 ${reverse} -S ${out} 2> ${stats} # ${out}";
        assert_eq!(
            required_bindings(command),
            vec!["genome", "forward", "reverse", "out", "stats"]
        );
    }

    #[test]
    fn test_required_bindings_skip_environment() {
        let command = "interproscan.sh -i ${in_dir}/${in_prefix}${SGE_TASK_ID} -T ${TMPDIR}";
        assert_eq!(required_bindings(command), vec!["in_dir", "in_prefix"]);
    }

    #[test]
    fn test_job_group_name() {
        assert_eq!(job_group_name("trimmomatic_%d", 42), "trimmomatic_42");
        assert_eq!(job_group_name("trimmomatic_pe_%d.sh", 42), "trimmomatic_pe_42.sh");
    }

    #[test]
    fn test_render_plain_script() {
        let template = StageTemplate::new("single", "hisat2_se_%d.sh", "hisat2 -x ${genome} -U ${fq} -S ${out}");
        let text = render_script(&JobGroup::new("hisat2_7"), &template, &["hisat2/2.1.0".to_string()]);
        assert_eq!(
            text,
            "#!/bin/bash\n#$ -N hisat2_7\n#$ -cwd\n\nmodule load hisat2/2.1.0\nhisat2 -x ${genome} -U ${fq} -S ${out}\n"
        );
    }

    #[test]
    fn test_render_array_script_without_modules() {
        let template = StageTemplate::new("default", "interproscan_%d.sh", "run ${in_dir}").with_array(100);
        let text = render_script(&JobGroup::new("interproscan_3"), &template, &[]);
        assert_eq!(text, "#!/bin/bash\n#$ -N interproscan_3\n#$ -cwd\n#$ -t 1-100\n\nrun ${in_dir}\n");
    }

    #[test]
    fn test_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let templates = vec![
            StageTemplate::new("single", "trimmomatic_se_%d.sh", "java -jar ${jar} SE ${in} ${out}"),
            StageTemplate::new("paired", "trimmomatic_pe_%d.sh", "java -jar ${jar} PE ${ina} ${inb}"),
        ];

        let set = ScriptSet::write_numbered("trimmomatic_%d", 17, &templates, &[], dir.path()).unwrap();
        assert_eq!(set.group().as_str(), "trimmomatic_17");

        let paired = set.template("paired").unwrap();
        assert_eq!(paired.script, dir.path().join("trimmomatic_pe_17.sh"));
        assert_eq!(paired.required, vec!["jar", "ina", "inb"]);
        assert!(paired.script.exists());
        assert_eq!(set.paths().len(), 2);

        set.remove().unwrap();
        assert!(!paired.script.exists());
        // second removal is a no-op
        set.remove().unwrap();
    }
}
