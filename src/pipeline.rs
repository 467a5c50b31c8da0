use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::analyzer::Analyzer;
use crate::config::Settings;
use crate::db;
use crate::files;
use crate::ingest;
use crate::report;
use crate::transformer::Transformer;
use crate::validator::{ValidationOutcome, Validator};

pub const DATA_SOURCE: &str = "iot_environmental_sensors";

#[derive(Debug, Serialize)]
pub struct PipelineStatus {
    pub processed_count: usize,
    pub failed_count: usize,
    pub success_rate: f64,
    pub database_healthy: bool,
}

/// Per-file orchestrator: ingest, validate, transform, analyze, persist,
/// archive. Holds only configuration, the connection pool, and counters.
pub struct Pipeline {
    settings: Settings,
    pool: PgPool,
    validator: Validator,
    transformer: Transformer,
    analyzer: Analyzer,
    processed_count: usize,
    failed_count: usize,
}

impl Pipeline {
    pub fn new(settings: Settings, pool: PgPool) -> Self {
        Self {
            settings,
            pool,
            validator: Validator::new(),
            transformer: Transformer::new(),
            analyzer: Analyzer::new(),
            processed_count: 0,
            failed_count: 0,
        }
    }

    /// Runs one file through the whole pipeline. `Ok(false)` means the file
    /// was rejected (quarantined or empty); `Err` means an infrastructure
    /// failure worth retrying. Persistence and archive failures are logged
    /// but never discard the computed results.
    pub async fn process_file(&mut self, path: &Path) -> Result<bool> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        info!(file = %file_name, "processing file");

        let table = ingest::read_csv(path)?;
        if table.is_empty() {
            warn!(file = %file_name, "file is empty, skipping");
            self.failed_count += 1;
            return Ok(false);
        }

        let valid = match self.validator.validate(&table) {
            ValidationOutcome::Quarantined { reasons, rejected } => {
                error!(file = %file_name, reasons = reasons.len(), "validation failed, quarantining");
                if let Err(e) =
                    files::log_invalid_data(&rejected, &file_name, &reasons, &self.settings.logs_dir)
                {
                    warn!(file = %file_name, "failed to log rejected rows: {e:#}");
                }
                if let Err(e) =
                    files::quarantine_file(path, &reasons, &self.settings.quarantine_dir)
                {
                    error!(file = %file_name, "failed to quarantine: {e:#}");
                }
                self.failed_count += 1;
                return Ok(false);
            }
            ValidationOutcome::Accepted {
                table,
                rejected,
                violations,
            } => {
                if !violations.is_empty() {
                    warn!(file = %file_name, count = violations.len(), "validation passed with violations");
                    if let Err(e) = files::log_invalid_data(
                        &rejected,
                        &file_name,
                        &violations,
                        &self.settings.logs_dir,
                    ) {
                        warn!(file = %file_name, "failed to log rejected rows: {e:#}");
                    }
                }
                table
            }
        };
        info!(file = %file_name, rows = valid.n_rows(), "validation passed");

        let (enriched, summary) = self.transformer.transform(&valid, &file_name, DATA_SOURCE);
        let analysis = self.analyzer.analyze(&enriched, &file_name, DATA_SOURCE);

        if let Err(e) = report::save_analysis_report(&analysis, &self.settings.logs_dir) {
            warn!(file = %file_name, "failed to save analysis report: {e:#}");
        }
        if let Err(e) = db::insert_raw(&self.pool, &enriched, &file_name, DATA_SOURCE).await {
            error!(file = %file_name, "failed to insert raw readings: {e:#}");
        }
        if let Err(e) = db::insert_aggregated(&self.pool, &analysis.aggregated_metrics).await {
            error!(file = %file_name, "failed to insert aggregated metrics: {e:#}");
        }
        if let Err(e) = files::move_processed(path, &self.settings.processed_dir) {
            warn!(file = %file_name, "failed to archive processed file: {e:#}");
        }

        self.processed_count += 1;
        info!(
            file = %file_name,
            rows = enriched.n_rows(),
            filled = summary.missing_values_reduced,
            "file processed"
        );
        Ok(true)
    }

    /// Retries infrastructure failures with exponential backoff. A
    /// rejection (quarantine) is a final answer and is not retried.
    pub async fn process_with_retry(&mut self, path: &Path) -> bool {
        let attempts = self.settings.max_retries.max(1);
        for attempt in 0..attempts {
            match self.process_file(path).await {
                Ok(accepted) => return accepted,
                Err(e) if attempt + 1 < attempts => {
                    let wait = backoff_secs(self.settings.retry_delay_secs, attempt);
                    warn!(
                        path = %path.display(),
                        attempt = attempt + 1,
                        "processing failed: {e:#}, retrying in {wait}s"
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Err(e) => {
                    error!(
                        path = %path.display(),
                        "processing failed permanently after {attempts} attempts: {e:#}"
                    );
                }
            }
        }
        self.failed_count += 1;
        false
    }

    pub async fn status(&self) -> PipelineStatus {
        let total = self.processed_count + self.failed_count;
        PipelineStatus {
            processed_count: self.processed_count,
            failed_count: self.failed_count,
            success_rate: self.processed_count as f64 / total.max(1) as f64 * 100.0,
            database_healthy: db::health_check(&self.pool).await,
        }
    }
}

/// Backoff for the nth retry; saturates instead of overflowing when the
/// retry count is configured absurdly high.
fn backoff_secs(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_settings(dir: &std::path::Path) -> Settings {
        Settings {
            database_url: "postgres://127.0.0.1:1/pipeline".to_string(),
            data_dir: dir.join("data"),
            quarantine_dir: dir.join("quarantine"),
            processed_dir: dir.join("processed"),
            logs_dir: dir.join("logs"),
            poll_interval_secs: 1,
            max_retries: 1,
            retry_delay_secs: 0,
        }
    }

    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://127.0.0.1:1/pipeline")
            .unwrap()
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sensor-pipeline-test-{}-{tag}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn backoff_doubles_per_attempt_and_saturates() {
        assert_eq!(backoff_secs(5, 0), 5);
        assert_eq!(backoff_secs(5, 1), 10);
        assert_eq!(backoff_secs(5, 3), 40);
        assert_eq!(backoff_secs(5, 64), u64::MAX);
        assert_eq!(backoff_secs(0, 64), 0);
    }

    #[tokio::test]
    async fn empty_file_is_rejected_and_counted_as_failed() {
        let dir = temp_dir("empty-file");
        let csv = dir.join("empty.csv");
        std::fs::write(&csv, "location_id,timestamp\n").unwrap();

        let mut pipeline = Pipeline::new(test_settings(&dir), lazy_pool());
        let accepted = pipeline.process_file(&csv).await.unwrap();

        assert!(!accepted);
        assert_eq!(pipeline.failed_count, 1);
        assert_eq!(pipeline.processed_count, 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn quarantined_file_leaves_an_invalid_data_log() {
        let dir = temp_dir("quarantine-log");
        let settings = test_settings(&dir);
        let csv = dir.join("bad.csv");
        // All required columns present, but every location is missing, so
        // every row is invalid and the file quarantines.
        std::fs::write(
            &csv,
            "location_id,timestamp,stress_level,sleep_hours,mood_score,\
             mental_health_status,noise_level_db,lighting_lux,crowd_density,\
             temperature_celsius\n\
             ,2026-03-01 10:00:00,20,7,4,0,40,300,10,21\n\
             ,2026-03-01 11:00:00,25,6,4,0,45,320,12,22\n",
        )
        .unwrap();

        let mut pipeline = Pipeline::new(settings.clone(), lazy_pool());
        let accepted = pipeline.process_file(&csv).await.unwrap();
        assert!(!accepted);

        let log = settings.logs_dir.join(format!(
            "invalid_data_{}.log",
            chrono::Utc::now().format("%Y%m%d")
        ));
        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("=== Invalid data from bad.csv"));
        assert!(contents.contains("Invalid rows count: 2"));
        assert!(settings.quarantine_dir.join("bad.csv").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
