use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use scopegate_pipeline::{ConsoleFormat, ConsoleSink, Pipeline, PipelineConfig};
use scopegate_source::{EmitterSettings, Logger, SampleEmitter};
use scopegate_types::LogLevel;

/// Scopegate - drops log events whose scope says so, batches the rest to the console
#[derive(Parser, Debug)]
#[command(name = "scopegate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline config file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Delay between batch exports in milliseconds (overrides the config file)
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Scope key inspected by the filter (overrides the config file)
    #[arg(long)]
    filter_key: Option<String>,

    /// Integer value of the filter key that drops an event (overrides the config file)
    #[arg(long, allow_hyphen_values = true)]
    drop_value: Option<i64>,

    /// Pause between sample events in milliseconds
    #[arg(long, default_value = "5000")]
    emit_interval_ms: u64,

    /// Stop after this many sample events
    #[arg(long)]
    iterations: Option<u64>,

    /// Severity of the sample events
    #[arg(long, default_value = "info", value_parser = parse_level)]
    level: LogLevel,

    /// Category of the sample events
    #[arg(long, default_value = "HostedService")]
    category: String,

    /// Console output format (text or json)
    #[arg(long, default_value = "text")]
    format: ConsoleFormat,
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown level '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Diagnostics go to stderr so they never mix with exported records
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// Read the config file (if any) and apply command line overrides
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(ms) = args.flush_interval_ms {
        config.batch.scheduled_delay_ms = ms;
    }
    if let Some(key) = &args.filter_key {
        config.filter.key = key.clone();
    }
    if let Some(value) = args.drop_value {
        config.filter.drop_value = value;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run_app(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    let pipeline = Pipeline::builder()
        .config(config)
        .sink(Arc::new(ConsoleSink::stdout(args.format)))
        .build()?;

    let logger = Logger::new(&args.category, pipeline.processor());
    let mut emitter = SampleEmitter::start(
        logger,
        EmitterSettings {
            interval: Duration::from_millis(args.emit_interval_ms),
            iterations: args.iterations,
            level: args.level,
        },
    );
    tracing::info!(
        filter_key = %pipeline.filter().key(),
        drop_value = pipeline.filter().drop_value(),
        "emitting sample events"
    );

    tokio::select! {
        _ = emitter.finished() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            tracing::info!("interrupt received, shutting down");
        }
    }

    // Stop the source first, then drain whatever the pipeline still holds
    let emitted = emitter.stop().await;
    pipeline.shutdown().await?;

    let stats = pipeline.stats();
    tracing::info!(
        emitted,
        exported = stats.batch.exported,
        filtered = stats.filter.dropped,
        "done"
    );

    Ok(())
}
