//! seqflow command line driver.

mod args;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use seqflow::cancellation::CancellationToken;
use seqflow::config::{DataLayout, PipelineConfig};
use seqflow::events::LoggingEventSink;
use seqflow::pipeline::PipelineSequencer;
use seqflow::scheduler::GridEngineClient;

use args::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load pipeline settings from {}", cli.config.display()))?;
    let layout = DataLayout::from_file(&cli.data)
        .with_context(|| format!("Failed to load dataset layout from {}", cli.data.display()))?;

    let config = Arc::new(config);
    let scheduler = Arc::new(GridEngineClient::from_config(&config));
    let mut sequencer = PipelineSequencer::standard(
        Arc::clone(&config),
        Arc::new(layout),
        scheduler,
        Arc::new(LoggingEventSink::default()),
        cli.options(),
    );
    for stage in cli.disabled_stages() {
        sequencer.disable(stage);
    }

    let cancel = Arc::new(CancellationToken::new());
    let on_signal = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; submitted jobs keep running on the scheduler");
            on_signal.cancel("interrupted");
        }
    });

    match sequencer.run(&cancel).await {
        Ok(report) => {
            info!(
                completed = report.completed().len(),
                quality_warnings = report.quality_warnings().count(),
                "Pipeline complete"
            );
            Ok(())
        }
        Err(err) if err.is_configuration() => {
            eprintln!("Sanity check failed, cannot start pipeline: {err}");
            Ok(())
        }
        Err(err) => Err(err).context("Pipeline failed"),
    }
}
