//! # Skyroster — certification-expiry alert engine
//!
//! Scans pilot certification expiries on a schedule, queues prioritized
//! email alerts, drains the queue with retry, and reclaims storage.
//!
//! Usage:
//!   skyroster run                        # Periodic job loop
//!   skyroster trigger expiry-check       # Manual one-shot job
//!   skyroster status                     # Queue and cache counters

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use skyroster_core::SkyrosterConfig;
use skyroster_scheduler::{
    AlertDb, JobKind, JobRunner, SmtpChannel, SqliteRosterSource, jobs,
};

#[derive(Parser)]
#[command(
    name = "skyroster",
    version,
    about = "✈️ Skyroster — certification-expiry alert engine"
)]
struct Cli {
    /// Config file path (default: ~/.skyroster/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Override the alert database path
    #[arg(long)]
    db_path: Option<String>,

    /// Override the roster database path
    #[arg(long)]
    roster_db: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic job loop
    Run {
        /// Seconds between ticks
        #[arg(long, default_value = "3600")]
        interval_secs: u64,
    },
    /// Trigger a single job now (expiry-check, queue-drain, cleanup)
    Trigger { job: JobKind },
    /// Show queue and cache counters
    Status,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "skyroster=debug,skyroster_scheduler=debug"
    } else {
        "skyroster=info,skyroster_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => SkyrosterConfig::load_from(Path::new(&expand_path(path)))?,
        None => SkyrosterConfig::load()?,
    };
    if let Some(db_path) = &cli.db_path {
        config.db_path = expand_path(db_path);
    }
    if let Some(roster_db) = &cli.roster_db {
        config.roster_db_path = expand_path(roster_db);
    }

    let db = Arc::new(AlertDb::open(Path::new(&expand_path(&config.db_path)))?);

    match cli.command {
        Command::Status => {
            let queue = db.queue_counts()?;
            println!("📬 Queue: {} pending, {} sent, {} failed", queue.pending, queue.sent, queue.failed);
            return Ok(());
        }
        Command::Run { interval_secs } => {
            let runner = Arc::new(build_runner(&config, db)?);
            jobs::spawn_job_loop(runner, interval_secs).await;
        }
        Command::Trigger { job } => {
            let runner = build_runner(&config, db)?;
            let result = runner.run(job).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn build_runner(config: &SkyrosterConfig, db: Arc<AlertDb>) -> Result<JobRunner> {
    let source = SqliteRosterSource::open(Path::new(&expand_path(&config.roster_db_path)))?;
    if config.smtp.username.is_empty() {
        tracing::warn!("⚠️ SMTP credentials not configured, deliveries will fail until set");
    }
    let channel = SmtpChannel::new(config.smtp.clone());
    Ok(JobRunner::new(
        Arc::new(source),
        Arc::new(channel),
        db,
        config,
    ))
}
