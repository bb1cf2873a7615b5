use anyhow::{Context, Result};
use clap::Parser;
use flatnet::capture::matching_devices;
use flatnet::cli::Cli;
use flatnet::config::AgentConfig;
use flatnet::discovery::build_resolver;
use flatnet::metrics::{PipelineMetrics, PrometheusExporter};
use flatnet::pipeline::Pipeline;
use flatnet::publisher::KafkaSink;
use flatnet::shutdown::{drain_or_abort, shutdown_signal, DrainOutcome};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting flatnet v{}", flatnet::VERSION);

    let config = AgentConfig::from_cli(&cli)?;

    let devices = matching_devices(&config.interface_regex()?)?;
    info!(devices = ?devices, "Capturing on matching interfaces");

    let sink = KafkaSink::connect(&config.brokers, &config.topic)
        .await
        .context("Failed to connect to kafka")?;

    let stop = CancellationToken::new();
    let resolver = build_resolver(&config.discovery, &stop).await?;

    let metrics = PipelineMetrics::new()?;
    let mut pipeline = Pipeline::spawn(&config, resolver, sink, metrics.clone(), stop);

    if pipeline.start_captures(&devices) == 0 {
        warn!("No interface could be opened, reports will stay empty");
    }

    info!(
        window_ms = config.window.as_millis() as u64,
        "flatnet running. Press Ctrl+C to stop."
    );

    shutdown_signal().await;
    info!("Stop signal received, draining pipeline (signal again to exit immediately)");

    match drain_or_abort(pipeline.shutdown(), shutdown_signal(), config.drain_timeout).await {
        DrainOutcome::Completed(result) => {
            result?;
        }
        DrainOutcome::Interrupted => {
            warn!("Second stop signal received, exiting without draining");
            process::exit(130);
        }
        DrainOutcome::TimedOut => {
            error!("Pipeline did not drain in time, exiting");
            process::exit(1);
        }
    }

    let exporter = PrometheusExporter::new(metrics);
    info!("{}", exporter.summary());
    match exporter.render() {
        Ok(text) => debug!("Final counters:\n{}", text),
        Err(e) => warn!(error = %e, "Could not render counters"),
    }

    info!("flatnet stopped");
    Ok(())
}
