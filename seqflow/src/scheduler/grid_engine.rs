//! Sun/Open Grid Engine client over `qsub` and `qstat`.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info};

use super::listing::{count_pending, parse_listing};
use super::{PollStatus, SchedulerClient};
use crate::config::{PipelineConfig, SchedulerSettings};
use crate::core::{JobGroup, JobHandle, JobSpec};
use crate::errors::{SchedulerError, SubmissionError};

static JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Your job(?:-array)? (\d+)").expect("JOB_ID regex is valid"));

/// Scheduler client that shells out to Grid Engine.
///
/// Jobs are submitted from the log directory, which is where `#$ -cwd`
/// makes Grid Engine write their stdout and stderr files.
#[derive(Debug, Clone)]
pub struct GridEngineClient {
    submit_command: String,
    status_command: String,
    owner: Option<String>,
    log_dir: PathBuf,
    stage_flags: BTreeMap<String, Vec<String>>,
}

impl GridEngineClient {
    /// Creates a client from scheduler settings.
    #[must_use]
    pub fn new(settings: &SchedulerSettings) -> Self {
        Self {
            submit_command: settings.submit_command.clone(),
            status_command: settings.status_command.clone(),
            owner: settings.resolved_owner(),
            log_dir: settings.log_dir.clone(),
            stage_flags: BTreeMap::new(),
        }
    }

    /// Creates a client with the scheduler flags of every configured stage.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut client = Self::new(&config.scheduler);
        for (stage, settings) in &config.stages {
            if !settings.flags.is_empty() {
                client = client.with_stage_flags(stage.clone(), settings.flags.clone());
            }
        }
        client
    }

    /// Sets the scheduler flags for one stage.
    #[must_use]
    pub fn with_stage_flags(mut self, stage: impl Into<String>, flags: Vec<String>) -> Self {
        self.stage_flags.insert(stage.into(), flags);
        self
    }

    /// Sets the owner whose jobs are polled.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Returns the owner whose jobs are polled.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Returns the directory jobs are submitted from.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Builds the submission arguments for a job spec.
    #[must_use]
    pub fn submit_args(&self, spec: &JobSpec) -> Vec<String> {
        let mut args: Vec<String> = self
            .stage_flags
            .get(spec.stage())
            .cloned()
            .unwrap_or_default();
        if !spec.bindings().is_empty() {
            args.push("-v".to_string());
            args.push(spec.serialized_bindings());
        }
        args.push(spec.template().script.to_string_lossy().into_owned());
        args
    }

    /// Builds the status query arguments.
    #[must_use]
    pub fn status_args(&self) -> Vec<String> {
        let mut args = vec!["-r".to_string()];
        if let Some(owner) = &self.owner {
            args.push("-u".to_string());
            args.push(owner.clone());
        }
        args
    }
}

/// Extracts the job id from `qsub` output.
#[must_use]
pub(crate) fn parse_job_id(stdout: &str) -> Option<String> {
    JOB_ID.captures(stdout).map(|c| c[1].to_string())
}

#[async_trait]
impl SchedulerClient for GridEngineClient {
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, SubmissionError> {
        let args = self.submit_args(spec);
        debug!(unit = spec.unit(), command = %self.submit_command, ?args, "Submitting job");

        let output = Command::new(&self.submit_command)
            .args(&args)
            .current_dir(&self.log_dir)
            .output()
            .await
            .map_err(|source| SubmissionError::Launch {
                unit: spec.unit().to_string(),
                command: self.submit_command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubmissionError::Rejected {
                unit: spec.unit().to_string(),
                reason: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        let id = parse_job_id(&stdout).ok_or_else(|| SubmissionError::Rejected {
            unit: spec.unit().to_string(),
            reason: format!("unexpected submission output: {}", stdout.trim()),
        })?;

        info!(unit = spec.unit(), group = %spec.group(), job_id = %id, "Submitted job");
        Ok(JobHandle::new(id, spec.group().clone(), spec.unit()))
    }

    async fn poll(&self, group: &JobGroup) -> Result<PollStatus, SchedulerError> {
        let output = Command::new(&self.status_command)
            .args(self.status_args())
            .output()
            .await
            .map_err(|source| SchedulerError::Launch {
                command: self.status_command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SchedulerError::Query {
                command: self.status_command.clone(),
                reason: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let entries = parse_listing(&listing);
        let pending = count_pending(&entries, group.as_str(), self.owner.as_deref());
        debug!(group = %group, pending, listed = entries.len(), "Polled job group");

        Ok(PollStatus::from_pending(pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageSettings;
    use crate::core::TemplateRef;
    use pretty_assertions::assert_eq;

    fn spec() -> JobSpec {
        JobSpec::builder(
            "trim_fastq",
            JobGroup::new("trimmomatic_9"),
            TemplateRef::new("single", "/scratch/trimmomatic_se_9.sh", vec!["in".to_string()]),
        )
        .unit("zma:B")
        .bind("in", "/data/B.fq.gz")
        .bind("out", "/trimmed/B.trimmed.fq.gz")
        .build()
        .unwrap()
    }

    fn settings(submit: &str, status: &str, log_dir: &Path) -> SchedulerSettings {
        SchedulerSettings {
            submit_command: submit.to_string(),
            status_command: status.to_string(),
            owner: Some("jdoe".to_string()),
            scratch_dir: log_dir.to_path_buf(),
            log_dir: log_dir.to_path_buf(),
        }
    }

    #[test]
    fn test_parse_job_id() {
        assert_eq!(
            parse_job_id("Your job 812345 (\"trimmomatic_9\") has been submitted\n"),
            Some("812345".to_string())
        );
        assert_eq!(
            parse_job_id("Your job-array 77.1-100:1 (\"interproscan_2\") has been submitted"),
            Some("77".to_string())
        );
        assert_eq!(parse_job_id("Unable to run job"), None);
    }

    #[test]
    fn test_submit_args_with_stage_flags() {
        let config = PipelineConfig::new()
            .with_stage("trim_fastq", StageSettings::new().with_flag("-q").with_flag("short.q"));
        let client = GridEngineClient::from_config(&config);

        assert_eq!(
            client.submit_args(&spec()),
            vec![
                "-q",
                "short.q",
                "-v",
                "in=/data/B.fq.gz,out=/trimmed/B.trimmed.fq.gz",
                "/scratch/trimmomatic_se_9.sh",
            ]
        );
    }

    #[test]
    fn test_status_args() {
        let client = GridEngineClient::new(&SchedulerSettings::default()).with_owner("jdoe");
        assert_eq!(client.status_args(), vec!["-r", "-u", "jdoe"]);
        assert_eq!(client.owner(), Some("jdoe"));
    }

    #[tokio::test]
    async fn test_submit_parses_job_id_from_command() {
        let dir = tempfile::tempdir().unwrap();
        let client = GridEngineClient::new(&settings("echo", "true", dir.path()));
        // `echo` prints its arguments; prefix them with a fake qsub reply.
        let client = client.with_stage_flags(
            "trim_fastq",
            vec!["Your".to_string(), "job".to_string(), "4242".to_string()],
        );

        let handle = client.submit(&spec()).await.unwrap();
        assert_eq!(handle.id, "4242");
        assert_eq!(handle.group.as_str(), "trimmomatic_9");
        assert_eq!(handle.unit, "zma:B");
    }

    #[tokio::test]
    async fn test_submit_failure_is_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let client = GridEngineClient::new(&settings("false", "true", dir.path()));
        let err = client.submit(&spec()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { .. }));
        assert_eq!(err.unit(), "zma:B");
    }

    #[tokio::test]
    async fn test_submit_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let client = GridEngineClient::new(&settings("/nonexistent/qsub", "true", dir.path()));
        let err = client.submit(&spec()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_poll_empty_listing_is_done() {
        let dir = tempfile::tempdir().unwrap();
        let client = GridEngineClient::new(&settings("true", "true", dir.path()));
        let status = client.poll(&JobGroup::new("trimmomatic_9")).await.unwrap();
        assert_eq!(status, PollStatus::Done);
    }

    #[tokio::test]
    async fn test_poll_failure_is_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = GridEngineClient::new(&settings("true", "false", dir.path()));
        let err = client.poll(&JobGroup::new("g")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Query { .. }));
    }
}
