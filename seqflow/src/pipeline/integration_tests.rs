//! End-to-end tests for pipeline sequencing.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::config::{DataLayout, PipelineConfig, SchedulerSettings, StageSettings};
    use crate::core::StageState;
    use crate::events::{names, CollectingEventSink, EventSink};
    use crate::pipeline::{PipelineSequencer, SequencerOptions, VerifyPolicy};
    use crate::scheduler::SchedulerClient;
    use crate::stages::catalog::{
        ALIGN, BUILD_INDEX, EXP_MATRIX, HTSEQ, INTERPRO, MCL, PCC, QUALITY, TRIM_FASTQ,
    };
    use crate::stages::PollPolicy;
    use crate::testing::{MockScheduler, TempDataset};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    const ALL_STAGES: [&str; 9] = [
        BUILD_INDEX, TRIM_FASTQ, ALIGN, HTSEQ, EXP_MATRIX, QUALITY, PCC, MCL, INTERPRO,
    ];

    struct Setup {
        dataset: TempDataset,
        scheduler: Arc<MockScheduler>,
        events: Arc<CollectingEventSink>,
    }

    impl Setup {
        fn new(scheduler: MockScheduler) -> Self {
            let dataset = TempDataset::new("zma");
            dataset.add_reads(&["A_1.fq.gz", "A_2.fq.gz", "B.fq.gz"]);
            Self {
                dataset,
                scheduler: Arc::new(scheduler),
                events: Arc::new(CollectingEventSink::new()),
            }
        }

        fn config(&self) -> PipelineConfig {
            PipelineConfig::new()
                .with_scheduler(SchedulerSettings {
                    scratch_dir: self.dataset.root().join("scratch"),
                    log_dir: self.dataset.root().join("logs"),
                    ..SchedulerSettings::default()
                })
                .with_polling(PollPolicy::new().with_interval(Duration::from_millis(1)))
                .with_quality_log(self.dataset.root().join("quality.log"))
                .with_stage(
                    TRIM_FASTQ,
                    StageSettings::new().with_param("jar", "/opt/trimmomatic/trimmomatic.jar"),
                )
        }

        fn sequencer(&self, config: PipelineConfig, layout: DataLayout, options: SequencerOptions) -> PipelineSequencer {
            PipelineSequencer::standard(
                Arc::new(config),
                Arc::new(layout),
                Arc::clone(&self.scheduler) as Arc<dyn SchedulerClient>,
                Arc::clone(&self.events) as Arc<dyn EventSink>,
                options,
            )
        }

        fn standard(&self, options: SequencerOptions) -> PipelineSequencer {
            self.sequencer(self.config(), self.dataset.layout(), options)
        }
    }

    #[test]
    fn test_standard_stage_order() {
        let setup = Setup::new(MockScheduler::new());
        let sequencer = setup.standard(SequencerOptions::default());

        assert_eq!(sequencer.stage_names(), ALL_STAGES.to_vec());
        for name in ALL_STAGES {
            assert_eq!(sequencer.state(name), Some(StageState::NotRun));
        }
    }

    #[tokio::test]
    async fn test_sanity_failure_runs_nothing() {
        let setup = Setup::new(MockScheduler::new());
        let mut sequencer = setup.sequencer(setup.config(), DataLayout::new(), SequencerOptions::default());

        let err = sequencer.run(&CancellationToken::new()).await.unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("[data] no genomes configured"));
        assert!(setup.scheduler.submitted().is_empty());
        assert!(setup.events.is_empty());
        assert_eq!(sequencer.state(BUILD_INDEX), Some(StageState::NotRun));
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let setup = Setup::new(MockScheduler::new().creating_outputs());
        let options = SequencerOptions {
            enable_log: true,
            ..SequencerOptions::default()
        };
        let mut sequencer = setup.standard(options);

        let report = sequencer.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.completed(), ALL_STAGES.to_vec());
        for name in ALL_STAGES {
            assert_eq!(sequencer.state(name), Some(StageState::Done));
        }

        let submitted = |stage: &str| setup.scheduler.submitted_for(stage).len();
        assert_eq!(submitted(BUILD_INDEX), 1);
        assert_eq!(submitted(TRIM_FASTQ), 2);
        assert_eq!(submitted(ALIGN), 2);
        assert_eq!(submitted(HTSEQ), 2);
        assert_eq!(submitted(PCC), 1);
        assert_eq!(submitted(MCL), 1);
        assert_eq!(submitted(INTERPRO), 1);

        let genome = setup.dataset.genome();
        // Trimmed reads are consumed by alignment, alignments by counting.
        assert!(!genome.trimmomatic_output.join("B.trimmed.fq.gz").exists());
        assert!(!genome.alignment_output.join("B.sam").exists());
        assert!(genome.htseq_output.join("B.htseq").exists());
        assert!(genome.exp_matrix_output.exists());
        assert!(genome.mcl_cluster_output.exists());
        assert!(setup.dataset.root().join("quality.log").exists());

        // Empty count tables fail the quality check without stopping the run.
        assert_eq!(report.quality_warnings().count(), 2);
        assert_eq!(setup.events.events_of_type(names::QUALITY_WARNING).len(), 2);

        assert_eq!(setup.events.events_of_type(names::STAGE_DONE).len(), 9);
        assert_eq!(setup.events.events_of_type(names::STAGE_SUBMITTED).len(), 7);
        assert_eq!(setup.events.events_of_type(names::STAGE_CLEANED).len(), 7);
    }

    #[tokio::test]
    async fn test_batch_stage_event_order() {
        let setup = Setup::new(MockScheduler::new().creating_outputs());
        let mut sequencer = setup.standard(SequencerOptions::default());
        for name in ALL_STAGES.iter().filter(|n| **n != TRIM_FASTQ) {
            sequencer.disable(name);
        }

        sequencer.run(&CancellationToken::new()).await.unwrap();

        let trim_events: Vec<String> = setup
            .events
            .events()
            .into_iter()
            .filter(|(event, data)| {
                event.starts_with("stage.") && data.as_ref().is_some_and(|d| d["stage"] == TRIM_FASTQ)
            })
            .map(|(event, _)| event)
            .collect();
        assert_eq!(
            trim_events,
            vec![
                names::STAGE_SUBMITTED,
                names::STAGE_AWAITING,
                names::STAGE_CLEANED,
                names::STAGE_DONE,
            ]
        );
    }

    #[tokio::test]
    async fn test_disabled_stages_are_skipped() {
        let setup = Setup::new(MockScheduler::new().creating_outputs());
        let mut sequencer = setup.standard(SequencerOptions::default());
        for name in &ALL_STAGES[..8] {
            assert!(sequencer.disable(name));
        }
        assert!(!sequencer.disable("samtools"));

        let report = sequencer.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.completed(), vec![INTERPRO]);
        assert_eq!(sequencer.state(ALIGN), Some(StageState::Skipped));
        assert_eq!(setup.events.events_of_type(names::STAGE_SKIPPED).len(), 8);
        assert_eq!(setup.scheduler.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_pipeline() {
        let setup = Setup::new(MockScheduler::new());
        let config = setup.config().with_verify(VerifyPolicy::Abort);
        let mut sequencer = setup.sequencer(config, setup.dataset.layout(), SequencerOptions::default());

        let err = sequencer.run(&CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("Stage 'build_index' is missing outputs"));
        assert_eq!(sequencer.state(BUILD_INDEX), Some(StageState::Failed));
        assert_eq!(sequencer.state(TRIM_FASTQ), Some(StageState::NotRun));
        assert_eq!(setup.events.events_of_type(names::STAGE_FAILED).len(), 1);
        assert_eq!(setup.scheduler.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_keeps_inputs_of_failed_units() {
        let setup = Setup::new(MockScheduler::new());
        let trimmed = setup.dataset.genome().trimmomatic_output.clone();
        std::fs::create_dir_all(&trimmed).unwrap();
        let reads = ["A_1.trimmed.paired.fq.gz", "A_2.trimmed.paired.fq.gz", "B.trimmed.fq.gz"];
        for read in reads {
            std::fs::write(trimmed.join(read), "").unwrap();
        }

        let config = setup.config().with_verify(VerifyPolicy::Abort);
        let mut sequencer = setup.sequencer(config, setup.dataset.layout(), SequencerOptions::default());
        for name in ALL_STAGES.iter().filter(|n| **n != ALIGN) {
            sequencer.disable(name);
        }

        let err = sequencer.run(&CancellationToken::new()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Stage 'align' is missing outputs for 2 unit(s): zma:A, zma:B"
        );
        assert_eq!(sequencer.state(ALIGN), Some(StageState::Failed));
        assert!(setup.events.events_of_type(names::STAGE_CLEANED).is_empty());
        for read in reads {
            assert!(trimmed.join(read).exists(), "{read} was removed");
        }
    }

    #[tokio::test]
    async fn test_unbound_stage_param_is_a_configuration_error() {
        let setup = Setup::new(MockScheduler::new().creating_outputs());
        let mut config = setup.config();
        config.stages.remove(TRIM_FASTQ);
        let mut sequencer = setup.sequencer(config, setup.dataset.layout(), SequencerOptions::default());

        let err = sequencer.run(&CancellationToken::new()).await.unwrap_err();

        assert!(err.is_configuration());
        assert!(err
            .to_string()
            .contains("trim_fastq 'single' command needs jar in [stages.trim_fastq.params]"));
        assert!(setup.scheduler.submitted().is_empty());

        sequencer.disable(TRIM_FASTQ);
        assert!(sequencer.validate().is_ok());
    }

    #[tokio::test]
    async fn test_warn_policy_continues_past_missing_outputs() {
        let setup = Setup::new(MockScheduler::new());
        let mut sequencer = setup.standard(SequencerOptions::default());
        for name in [ALIGN, HTSEQ, EXP_MATRIX, QUALITY, PCC, MCL, INTERPRO] {
            sequencer.disable(name);
        }

        let report = sequencer.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.completed(), vec![BUILD_INDEX, TRIM_FASTQ]);
        assert_eq!(report.stage(TRIM_FASTQ).unwrap().result.as_ref().unwrap().missing.len(), 2);
        assert_eq!(setup.events.events_of_type(names::OUTPUTS_MISSING).len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_submits_nothing() {
        let setup = Setup::new(MockScheduler::new());
        let mut sequencer = setup.standard(SequencerOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel("interrupted");

        let err = sequencer.run(&cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(setup.scheduler.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_skips_finished_units() {
        let setup = Setup::new(MockScheduler::new().creating_outputs());
        let options = SequencerOptions {
            keep_intermediate: true,
            ..SequencerOptions::default()
        };

        setup.standard(options).run(&CancellationToken::new()).await.unwrap();
        let first = setup.scheduler.submitted().len();

        let report = setup.standard(options).run(&CancellationToken::new()).await.unwrap();

        assert_eq!(setup.scheduler.submitted().len(), first);
        assert_eq!(report.completed(), ALL_STAGES.to_vec());
        assert_eq!(report.stage(ALIGN).unwrap().result.as_ref().unwrap().skipped.len(), 2);
        assert!(setup.dataset.genome().trimmomatic_output.join("B.trimmed.fq.gz").exists());
    }

    #[tokio::test]
    async fn test_overwrite_resubmits() {
        let setup = Setup::new(MockScheduler::new().creating_outputs());
        let keep = SequencerOptions {
            keep_intermediate: true,
            ..SequencerOptions::default()
        };
        setup.standard(keep).run(&CancellationToken::new()).await.unwrap();
        let first = setup.scheduler.submitted().len();

        let overwrite = SequencerOptions {
            idempotent: false,
            ..keep
        };
        setup.standard(overwrite).run(&CancellationToken::new()).await.unwrap();

        assert_eq!(setup.scheduler.submitted().len(), first * 2);
    }

    #[tokio::test]
    async fn test_duplicate_stage_is_a_configuration_error() {
        let setup = Setup::new(MockScheduler::new());
        let mut sequencer = setup
            .standard(SequencerOptions::default())
            .batch(crate::stages::catalog::MclStage);

        let err = sequencer.run(&CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("stage 'mcl' is scheduled twice"));
    }
}
