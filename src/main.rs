use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use ssb::core::{FsLogSink, Orchestrator, Report};
use ssb::core::executor::ssh::SshExecutor;
use ssb::{config, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ssb")]
#[command(about = "Parallel per-host server backups over ssh/rsync", long_about = None)]
struct Cli {
    /// Main configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    overrides: Overrides,
}

/// CLI-level overrides layered on top of the config file and environment.
#[derive(clap::Args, Serialize)]
struct Overrides {
    /// Maximum number of hosts backed up concurrently
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-invocation timeout for remote commands and transfers, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    command_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(logging::LogConfig {
        json: cli.json,
        verbose: cli.verbose,
    });

    match run(&cli).await {
        Ok(report) if report.all_succeeded() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli) -> Result<Report> {
    let config = config::AppConfig::load(&cli.config, Some(&cli.overrides))
        .context("failed to load configuration")?;

    let profiles = config::load_host_profiles(&config.servers_dir)
        .context("failed to load host profiles")?;
    let catalog = config::discover_scripts(&config.scripts_dir, &profiles)
        .context("failed to discover scripts")?;

    let executor = Arc::new(SshExecutor::new(config.command_timeout()));
    let sink = Arc::new(FsLogSink::new(&config.log_dir));

    let orchestrator = Orchestrator::new(executor, sink, &config.backup_dir);
    let report = orchestrator
        .run(profiles, &catalog, config.concurrency)
        .await?;

    for outcome in &report.outcomes {
        if outcome.success {
            info!("{}: {}", outcome.host, outcome.message);
        } else {
            error!("{}: {}", outcome.host, outcome.message);
        }
    }
    info!(
        "{} of {} hosts backed up successfully",
        report.succeeded, report.submitted
    );

    Ok(report)
}
