use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use crate::models::AnalysisReport;

/// Writes the analysis report as pretty-printed JSON into the logs
/// directory, named by source file and capture time.
pub fn save_analysis_report(report: &AnalysisReport, logs_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create {}", logs_dir.display()))?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = logs_dir.join(format!("analysis_report_{}_{stamp}.json", report.file_name));
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write report {}", path.display()))?;

    info!(report = %path.display(), "analysis report saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::models::DataQualityMetrics;

    #[test]
    fn report_round_trips_through_json() {
        let report = AnalysisReport {
            file_name: "readings.csv".to_string(),
            data_source: "unit_test".to_string(),
            analysis_timestamp: Utc::now().to_rfc3339(),
            basic_statistics: BTreeMap::new(),
            correlations: BTreeMap::from([("a_vs_b".to_string(), 0.5)]),
            anomalies: BTreeMap::new(),
            temporal_patterns: BTreeMap::new(),
            data_quality: DataQualityMetrics::default(),
            aggregated_metrics: Vec::new(),
            error: None,
        };

        let dir = std::env::temp_dir().join(format!("sensor-report-test-{}", std::process::id()));
        let path = save_analysis_report(&report, &dir).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(parsed["file_name"], "readings.csv");
        assert_eq!(parsed["correlations"]["a_vs_b"], 0.5);
        // A clean run serializes no error field at all.
        assert!(parsed.get("error").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
