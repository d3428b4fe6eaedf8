use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use stagewatch::api::{load_events, snapshot_of};
use stagewatch::prelude::*;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod render;
mod replay;

/// Stagewatch CLI to inspect and replay recorded pipeline stage events
#[derive(Debug, Parser)]
#[command(name = "stagewatch", version, about, long_about = None)]
struct Args {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "STAGEWATCH_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "STAGEWATCH_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the configured stage table
    Stages {
        /// Print the table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Derive the snapshot of a run from a file of recorded events
    Compute {
        /// Path to a JSON array or newline-delimited JSON file of events
        #[arg(short, long)]
        file: PathBuf,

        /// Run to derive, required when the file holds several runs
        #[arg(short, long)]
        run_id: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Replay recorded events through a live observer
    Replay {
        /// Path to a JSON array or newline-delimited JSON file of events
        #[arg(short, long)]
        file: PathBuf,

        /// Run to replay, required when the file holds several runs
        #[arg(short, long)]
        run_id: Option<String>,

        /// Delay between two replayed events in milliseconds
        #[arg(long, env = "STAGEWATCH_STEP_MS", default_value = "250")]
        step_ms: u64,

        /// Path to an observer configuration file (TOML)
        #[arg(short, long, env = "STAGEWATCH_CONFIG")]
        config: Option<PathBuf>,

        /// Override the poll interval of the observer in milliseconds
        #[arg(long, env = "STAGEWATCH_POLL_INTERVAL_MS")]
        poll_interval_ms: Option<u64>,

        /// Record every n-th event without pushing it, the observer has to
        /// recover it by polling
        #[arg(long)]
        drop_every: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Serialize)]
struct StageListing<'a> {
    count: usize,
    stages: &'a [StageRange],
}

/// Load the observer configuration, applying command line overrides
fn load_config(
    path: Option<&Path>,
    poll_interval_ms: Option<u64>,
) -> Result<ObserverConfig, anyhow::Error> {
    let config = match path {
        Some(path) => {
            debug!("Loading observer configuration from: {}", path.display());
            parse_config_file(path)?
        }
        None => ObserverConfig::default(),
    };

    match poll_interval_ms {
        Some(poll_interval_ms) => ObserverConfig::try_new(
            poll_interval_ms,
            config.channel_capacity(),
            config.poll_after_terminal(),
        )
        .context("invalid poll interval override"),
        None => Ok(config),
    }
}

fn parse_config_file(path: &Path) -> Result<ObserverConfig, anyhow::Error> {
    #[cfg(feature = "toml")]
    {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        ObserverConfig::from_toml_str(&contents).context("failed to parse TOML config file")
    }
    #[cfg(not(feature = "toml"))]
    {
        Err(anyhow!(
            "TOML support is not enabled in this build of stagewatch-cli, cannot read {}.\n\
            Please reinstall with: cargo install stagewatch-cli --features toml",
            path.display()
        ))
    }
}

fn print_stages(json: bool) -> Result<(), anyhow::Error> {
    let table = default_stage_table();

    if json {
        let listing = StageListing {
            count: table.len(),
            stages: table.ranges(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for (position, range) in table.iter().enumerate() {
        println!(
            "{:>2}. {:<12} {:>3}% - {:>3}%  {}",
            position + 1,
            range.name,
            range.min,
            range.max,
            range.label
        );
    }

    Ok(())
}

fn compute(file: &Path, run_id: Option<&str>, format: OutputFormat) -> Result<(), anyhow::Error> {
    let events = load_events(file).context("failed to load recorded events")?;
    let snapshot = snapshot_of(default_stage_table(), events, run_id)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Text => println!("{}", render::snapshot_line(&snapshot)),
    }

    Ok(())
}

fn init_tracing(log_level: &str, json: bool) -> Result<(), anyhow::Error> {
    let log_level =
        Level::from_str(log_level.to_lowercase().as_str()).map_err(|e| anyhow!("{e}: {log_level}"))?;
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    // logs go to stderr so that stdout only carries command output
    if json {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json)?;

    match args.command {
        Commands::Stages { json } => print_stages(json)?,
        Commands::Compute {
            file,
            run_id,
            format,
        } => compute(&file, run_id.as_deref(), format)?,
        Commands::Replay {
            file,
            run_id,
            step_ms,
            config,
            poll_interval_ms,
            drop_every,
        } => {
            let config = load_config(config.as_deref(), poll_interval_ms)?;
            replay::run_replay(replay::ReplayOptions {
                file,
                run_id,
                step: std::time::Duration::from_millis(step_ms),
                config,
                drop_every,
            })
            .await?;
        }
    }

    Ok(())
}
