//! Pipeline settings: scheduler, stages and engine policies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::OrphanPolicy;
use crate::errors::ConfigError;
use crate::pipeline::VerifyPolicy;
use crate::stages::PollPolicy;

/// Which read aligner the alignment and counting stages target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aligner {
    /// HISAT2: one `.sam` file per sample.
    #[default]
    Hisat2,
    /// TopHat 2: one directory per sample holding `accepted_hits.bam`.
    Tophat,
}

/// How to reach the batch scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Submission executable.
    #[serde(default = "default_submit_command")]
    pub submit_command: String,
    /// Status listing executable.
    #[serde(default = "default_status_command")]
    pub status_command: String,
    /// Owner used to filter the listing. Defaults to `$USER`.
    #[serde(default)]
    pub owner: Option<String>,
    /// Where generated submission scripts are written.
    #[serde(default = "default_dir")]
    pub scratch_dir: PathBuf,
    /// Where the scheduler drops job stdout/stderr files.
    #[serde(default = "default_dir")]
    pub log_dir: PathBuf,
}

fn default_submit_command() -> String {
    "qsub".to_string()
}

fn default_status_command() -> String {
    "qstat".to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            submit_command: default_submit_command(),
            status_command: default_status_command(),
            owner: None,
            scratch_dir: default_dir(),
            log_dir: default_dir(),
        }
    }
}

impl SchedulerSettings {
    /// Returns the configured owner, falling back to `$USER`.
    #[must_use]
    pub fn resolved_owner(&self) -> Option<String> {
        self.owner
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|owner| !owner.is_empty())
    }
}

/// Submission settings for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSettings {
    /// Extra scheduler flags (queue, resources, ...).
    #[serde(default)]
    pub flags: Vec<String>,
    /// Environment modules loaded by the script.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Command template per variant ("single", "paired", ...).
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
    /// Static bindings passed to every job of the stage.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Overrides the barrier poll interval for this stage.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl StageSettings {
    /// Creates empty stage settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the command for a variant.
    #[must_use]
    pub fn with_command(mut self, variant: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.insert(variant.into(), command.into());
        self
    }

    /// Adds a module.
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.modules.push(module.into());
        self
    }

    /// Adds a scheduler flag.
    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Adds a static binding.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Returns the per-stage poll interval override.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }
}

/// Everything the engine needs besides the dataset layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scheduler access.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Aligner used by the alignment and counting stages.
    #[serde(default)]
    pub aligner: Aligner,
    /// Barrier polling policy.
    #[serde(default)]
    pub polling: PollPolicy,
    /// What to do about missing outputs after a stage.
    #[serde(default)]
    pub verify: VerifyPolicy,
    /// What to do with a paired file whose partner is missing.
    #[serde(default)]
    pub orphans: OrphanPolicy,
    /// Where quality statistics are appended when logging is enabled.
    #[serde(default = "default_quality_log")]
    pub quality_log: PathBuf,
    /// Per-stage submission settings keyed by stage name.
    #[serde(default)]
    pub stages: BTreeMap<String, StageSettings>,
}

fn default_quality_log() -> PathBuf {
    PathBuf::from("seqflow_quality.log")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            aligner: Aligner::default(),
            polling: PollPolicy::default(),
            verify: VerifyPolicy::default(),
            orphans: OrphanPolicy::default(),
            quality_log: default_quality_log(),
            stages: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults and no stages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the quality log path.
    #[must_use]
    pub fn with_quality_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.quality_log = path.into();
        self
    }

    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        super::load_toml(path)
    }

    /// Sets the scheduler settings.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerSettings) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Sets the aligner.
    #[must_use]
    pub fn with_aligner(mut self, aligner: Aligner) -> Self {
        self.aligner = aligner;
        self
    }

    /// Sets the polling policy.
    #[must_use]
    pub fn with_polling(mut self, polling: PollPolicy) -> Self {
        self.polling = polling;
        self
    }

    /// Sets the verify policy.
    #[must_use]
    pub fn with_verify(mut self, verify: VerifyPolicy) -> Self {
        self.verify = verify;
        self
    }

    /// Sets the orphan policy.
    #[must_use]
    pub fn with_orphans(mut self, orphans: OrphanPolicy) -> Self {
        self.orphans = orphans;
        self
    }

    /// Sets the settings of one stage.
    #[must_use]
    pub fn with_stage(mut self, name: impl Into<String>, settings: StageSettings) -> Self {
        self.stages.insert(name.into(), settings);
        self
    }

    /// Returns the settings of a stage, if configured.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSettings> {
        self.stages.get(name)
    }

    /// Returns the poll policy for a stage, applying its interval override.
    #[must_use]
    pub fn poll_policy_for(&self, stage: &str) -> PollPolicy {
        match self.stage(stage).and_then(StageSettings::poll_interval) {
            Some(interval) => self.polling.clone().with_interval(interval),
            None => self.polling.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::BackoffStrategy;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
aligner = "tophat"
quality_log = "/tmp/quality.log"
verify = "abort"
orphans = "drop"

[scheduler]
owner = "jdoe"
scratch_dir = "/scratch/jdoe"

[polling]
interval_ms = 30000
backoff = "linear"
max_interval_ms = 120000

[stages.trim_fastq]
flags = ["-q", "short.q"]
params = { jar = "/opt/trimmomatic.jar" }
poll_interval_ms = 5000

[stages.trim_fastq.commands]
single = "java -jar ${jar} SE ${in} ${out}"
paired = "java -jar ${jar} PE ${ina} ${inb} ${outap} ${outau} ${outbp} ${outbu}"
"#;

    #[test]
    fn test_parse_full_config() {
        let config: PipelineConfig = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.aligner, Aligner::Tophat);
        assert_eq!(config.scheduler.submit_command, "qsub");
        assert_eq!(config.scheduler.owner.as_deref(), Some("jdoe"));
        assert_eq!(config.scheduler.log_dir, PathBuf::from("."));
        assert_eq!(config.polling.backoff, BackoffStrategy::Linear);
        assert_eq!(config.verify, VerifyPolicy::Abort);
        assert_eq!(config.orphans, OrphanPolicy::Drop);

        let trim = config.stage("trim_fastq").unwrap();
        assert_eq!(trim.flags, vec!["-q", "short.q"]);
        assert_eq!(trim.params.get("jar").map(String::as_str), Some("/opt/trimmomatic.jar"));
        assert_eq!(trim.commands.len(), 2);
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.aligner, Aligner::Hisat2);
        assert_eq!(config.verify, VerifyPolicy::Warn);
        assert_eq!(config.orphans, OrphanPolicy::DegradeToSingle);
        assert_eq!(config.quality_log, PathBuf::from("seqflow_quality.log"));
        assert!(config.stages.is_empty());
    }

    #[test]
    fn test_poll_policy_override() {
        let config: PipelineConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.poll_policy_for("trim_fastq").interval(), Duration::from_millis(5000));
        assert_eq!(config.poll_policy_for("align").interval(), Duration::from_millis(30000));
    }

    #[test]
    fn test_resolved_owner_prefers_config() {
        let settings = SchedulerSettings {
            owner: Some("alice".to_string()),
            ..SchedulerSettings::default()
        };
        assert_eq!(settings.resolved_owner().as_deref(), Some("alice"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/seqflow.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "aligner = 3").unwrap();
        let err = PipelineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
