use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod analyzer;
mod config;
mod db;
mod files;
mod ingest;
mod models;
mod monitor;
mod pipeline;
mod report;
mod schema;
mod stats;
mod table;
mod transformer;
mod validator;

#[derive(Parser)]
#[command(name = "sensor-data-pipeline")]
#[command(about = "Data-quality pipeline for environmental and mental-health sensor readings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Run a single CSV file through validation, transformation and analysis
    Process {
        #[arg(long)]
        file: PathBuf,
    },
    /// Poll the data directory and process new CSV files as they arrive
    Watch {
        /// Poll interval in seconds (defaults to PIPELINE_POLL_INTERVAL_SECS)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Show pipeline configuration and database health
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = config::Settings::from_env()?;
    settings.ensure_directories()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Process { file } => {
            anyhow::ensure!(file.exists(), "file not found: {}", file.display());
            let mut pipeline = pipeline::Pipeline::new(settings, pool);
            let accepted = pipeline.process_with_retry(&file).await;
            if !accepted {
                anyhow::bail!("processing failed for {}", file.display());
            }
            println!("Processed {}.", file.display());
        }
        Commands::Watch { interval } => {
            let secs = interval.unwrap_or(settings.poll_interval_secs);
            let watch_dir = settings.data_dir.clone();
            let mut pipeline = pipeline::Pipeline::new(settings, pool);
            let mut poller =
                monitor::DirectoryPoller::new(watch_dir, Duration::from_secs(secs.max(1)));
            poller.run(&mut pipeline).await?;

            let status = pipeline.status().await;
            println!(
                "Stopped after {} processed, {} failed ({:.1}% success).",
                status.processed_count, status.failed_count, status.success_rate
            );
        }
        Commands::Status => {
            println!("Pipeline status:");
            println!("  data dir:         {}", settings.data_dir.display());
            println!("  quarantine dir:   {}", settings.quarantine_dir.display());
            println!("  processed dir:    {}", settings.processed_dir.display());
            println!("  logs dir:         {}", settings.logs_dir.display());
            println!("  poll interval:    {}s", settings.poll_interval_secs);
            println!("  database healthy: {}", db::health_check(&pool).await);
        }
    }

    Ok(())
}
