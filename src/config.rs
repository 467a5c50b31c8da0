use std::path::PathBuf;

use anyhow::Context;

/// Process-wide settings, read once from the environment in `main` and
/// passed down by value. Nothing in the pipeline reads the environment
/// after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        Ok(Self {
            database_url,
            data_dir: env_path("PIPELINE_DATA_DIR", "data"),
            quarantine_dir: env_path("PIPELINE_QUARANTINE_DIR", "quarantine"),
            processed_dir: env_path("PIPELINE_PROCESSED_DIR", "processed"),
            logs_dir: env_path("PIPELINE_LOGS_DIR", "logs"),
            poll_interval_secs: env_u64("PIPELINE_POLL_INTERVAL_SECS", 10)?,
            max_retries: env_u64("PIPELINE_MAX_RETRIES", 3)? as u32,
            retry_delay_secs: env_u64("PIPELINE_RETRY_DELAY_SECS", 5)?,
        })
    }

    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [
            &self.data_dir,
            &self.quarantine_dir,
            &self.processed_dir,
            &self.logs_dir,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map_or_else(|_| PathBuf::from(default), PathBuf::from)
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
