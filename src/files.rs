use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use crate::table::Table;

/// Moves a rejected file into the quarantine directory and writes a
/// plain-text manifest next to it: a timestamp line followed by one
/// `- <reason>` line per violation.
pub fn quarantine_file(
    path: &Path,
    reasons: &[String],
    quarantine_dir: &Path,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(quarantine_dir)
        .with_context(|| format!("failed to create {}", quarantine_dir.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?
        .to_string_lossy()
        .to_string();
    let destination = quarantine_dir.join(&file_name);
    move_file(path, &destination)?;
    info!(file = %file_name, "file moved to quarantine");

    let manifest = quarantine_dir.join(format!("{file_name}.error_log"));
    let mut contents = format!("File quarantined at: {}\nValidation errors:\n", Utc::now());
    for reason in reasons {
        contents.push_str("- ");
        contents.push_str(reason);
        contents.push('\n');
    }
    std::fs::write(&manifest, contents)
        .with_context(|| format!("failed to write manifest {}", manifest.display()))?;

    Ok(destination)
}

/// Appends an audit entry for rejected rows to a per-day log in the logs
/// directory: the violation list, the rejected-row count, and up to five
/// sample rows. Runs for accepted files too, so partially-invalid data
/// leaves a trace beyond the process log. No-op when nothing was rejected.
pub fn log_invalid_data(
    rejected: &Table,
    file_name: &str,
    violations: &[String],
    logs_dir: &Path,
) -> anyhow::Result<()> {
    if rejected.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create {}", logs_dir.display()))?;

    let path = logs_dir.join(format!("invalid_data_{}.log", Utc::now().format("%Y%m%d")));
    let mut entry = format!(
        "\n=== Invalid data from {file_name} at {} ===\n",
        Utc::now()
    );
    entry.push_str(&format!("Validation errors: {violations:?}\n"));
    entry.push_str(&format!("Invalid rows count: {}\n", rejected.n_rows()));
    entry.push_str("Sample invalid data:\n");
    entry.push_str(&sample_rows(rejected, 5));
    entry.push('\n');
    entry.push_str(&"=".repeat(60));
    entry.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(entry.as_bytes())
        .with_context(|| format!("failed to append to {}", path.display()))?;

    info!(
        log = %path.display(),
        rows = rejected.n_rows(),
        "logged rejected rows"
    );
    Ok(())
}

fn sample_rows(table: &Table, limit: usize) -> String {
    let mut out = table.columns().join(", ");
    for row in table.rows().iter().take(limit) {
        out.push('\n');
        let cells: Vec<String> = row.iter().map(|v| v.display()).collect();
        out.push_str(&cells.join(", "));
    }
    out
}

/// Archives a successfully processed file. A name collision gets a
/// timestamp suffix instead of overwriting the earlier archive.
pub fn move_processed(path: &Path, processed_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(processed_dir)
        .with_context(|| format!("failed to create {}", processed_dir.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?
        .to_string_lossy()
        .to_string();

    let mut destination = processed_dir.join(&file_name);
    if destination.exists() {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone());
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        destination = processed_dir.join(format!("{stem}_{stamp}{ext}"));
    }

    move_file(path, &destination)?;
    info!(destination = %destination.display(), "moved processed file");
    Ok(destination)
}

/// Rename, falling back to copy-and-delete when source and destination sit
/// on different filesystems.
fn move_file(from: &Path, to: &Path) -> anyhow::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)
        .with_context(|| format!("failed to move {} to {}", from.display(), to.display()))?;
    std::fs::remove_file(from)
        .with_context(|| format!("failed to remove {} after copy", from.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sensor-files-test-{}-{tag}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn quarantine_writes_manifest_with_reasons() {
        let dir = temp_dir("quarantine");
        let source = dir.join("bad.csv");
        std::fs::write(&source, "a,b\n1,2\n").unwrap();
        let quarantine = dir.join("quarantine");

        let reasons = vec!["Missing required columns: [timestamp]".to_string()];
        let moved = quarantine_file(&source, &reasons, &quarantine).unwrap();

        assert!(moved.exists());
        assert!(!source.exists());
        let manifest = std::fs::read_to_string(quarantine.join("bad.csv.error_log")).unwrap();
        assert!(manifest.starts_with("File quarantined at: "));
        assert!(manifest.contains("- Missing required columns: [timestamp]"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn invalid_data_log_appends_one_entry_per_batch() {
        use crate::table::Value;

        let dir = temp_dir("invalid-log");
        let mut rejected = Table::new(vec![
            "location_id".to_string(),
            "stress_level".to_string(),
        ]);
        rejected.push_row(vec![Value::Text("room_a".to_string()), Value::Null]);

        let violations = vec!["Found 1 rows with missing stress_level".to_string()];
        log_invalid_data(&rejected, "readings.csv", &violations, &dir).unwrap();
        log_invalid_data(&rejected, "readings.csv", &violations, &dir).unwrap();

        let log = dir.join(format!("invalid_data_{}.log", Utc::now().format("%Y%m%d")));
        let contents = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            contents
                .matches("=== Invalid data from readings.csv")
                .count(),
            2
        );
        assert!(contents.contains("Found 1 rows with missing stress_level"));
        assert!(contents.contains("Invalid rows count: 1"));
        assert!(contents.contains("location_id, stress_level"));
        assert!(contents.contains("room_a, null"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn nothing_rejected_writes_no_log() {
        let dir = temp_dir("invalid-log-empty");
        let rejected = Table::new(vec!["location_id".to_string()]);
        log_invalid_data(&rejected, "readings.csv", &[], &dir).unwrap();
        assert!(std::fs::read_dir(&dir).unwrap().next().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn processed_collision_gets_timestamp_suffix() {
        let dir = temp_dir("processed");
        let processed = dir.join("processed");
        std::fs::create_dir_all(&processed).unwrap();
        std::fs::write(processed.join("data.csv"), "old").unwrap();

        let source = dir.join("data.csv");
        std::fs::write(&source, "new").unwrap();
        let moved = move_processed(&source, &processed).unwrap();

        assert_ne!(moved, processed.join("data.csv"));
        let name = moved.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("data_") && name.ends_with(".csv"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
