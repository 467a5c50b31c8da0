use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use crate::pipeline::Pipeline;

/// Polls a directory for new CSV files and feeds each one through the
/// pipeline exactly once per path. Files already present at startup are
/// processed on the first scan.
pub struct DirectoryPoller {
    watch_dir: PathBuf,
    interval: Duration,
    seen: HashSet<PathBuf>,
}

impl DirectoryPoller {
    pub fn new(watch_dir: PathBuf, interval: Duration) -> Self {
        Self {
            watch_dir,
            interval,
            seen: HashSet::new(),
        }
    }

    /// Scans until ctrl-c.
    pub async fn run(&mut self, pipeline: &mut Pipeline) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.watch_dir)
            .with_context(|| format!("failed to create {}", self.watch_dir.display()))?;
        info!(
            dir = %self.watch_dir.display(),
            interval_secs = self.interval.as_secs(),
            "polling for new csv files"
        );

        loop {
            self.scan_once(pipeline).await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested, stopping poller");
                    return Ok(());
                }
            }
        }
    }

    async fn scan_once(&mut self, pipeline: &mut Pipeline) {
        let entries = match std::fs::read_dir(&self.watch_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(dir = %self.watch_dir.display(), "failed to scan directory: {e}");
                return;
            }
        };

        let mut new_files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_candidate(path) && !self.seen.contains(path))
            .collect();
        new_files.sort();

        for path in new_files {
            info!(file = %path.display(), "new file detected");
            self.seen.insert(path.clone());
            pipeline.process_with_retry(&path).await;
        }
    }
}

/// A non-empty file with a .csv extension.
fn is_candidate(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        && std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_non_empty_csv_files_are_candidates() {
        let dir = std::env::temp_dir().join(format!("sensor-monitor-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let csv = dir.join("readings.CSV");
        std::fs::write(&csv, "a,b\n1,2\n").unwrap();
        let empty = dir.join("empty.csv");
        std::fs::write(&empty, "").unwrap();
        let text = dir.join("notes.txt");
        std::fs::write(&text, "hello").unwrap();

        assert!(is_candidate(&csv));
        assert!(!is_candidate(&empty));
        assert!(!is_candidate(&text));
        assert!(!is_candidate(&dir.join("missing.csv")));

        std::fs::remove_dir_all(&dir).ok();
    }
}
