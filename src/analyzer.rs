use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Timelike, Utc};
use tracing::{info, warn};

use crate::models::{
    AggregatedMetricRecord, AnalysisReport, AnomalySummary, BucketStats, ColumnQuality,
    DataQualityMetrics, MetricStats, TemporalPattern,
};
use crate::schema;
use crate::stats;
use crate::table::Table;

/// Minimum sample count (exclusive) before anomaly detection runs on a
/// metric.
const ANOMALY_MIN_SAMPLES: usize = 10;

/// Stateless analyzer over an enriched table. Expects canonical column
/// names but computes everything from the raw cells; derived columns from
/// the transformer are not required.
pub struct Analyzer {
    metrics: Vec<&'static str>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            metrics: schema::METRIC_COLUMNS.to_vec(),
        }
    }

    /// Runs the five analyses. A failure in one is recorded in the report's
    /// `error` field and the rest still run; nothing propagates to the
    /// caller.
    pub fn analyze(&self, table: &Table, file_name: &str, data_source: &str) -> AnalysisReport {
        info!(file = file_name, "starting analysis");
        let mut report = AnalysisReport {
            file_name: file_name.to_string(),
            data_source: data_source.to_string(),
            analysis_timestamp: Utc::now().to_rfc3339(),
            basic_statistics: BTreeMap::new(),
            correlations: BTreeMap::new(),
            anomalies: BTreeMap::new(),
            temporal_patterns: BTreeMap::new(),
            data_quality: DataQualityMetrics::default(),
            aggregated_metrics: Vec::new(),
            error: None,
        };
        let mut errors = Vec::new();

        match self.basic_statistics(table, &[schema::LOCATION_COLUMN]) {
            Ok(v) => report.basic_statistics = v,
            Err(e) => errors.push(format!("basic_statistics: {e}")),
        }
        match self.correlations(table) {
            Ok(v) => report.correlations = v,
            Err(e) => errors.push(format!("correlations: {e}")),
        }
        match self.anomalies(table) {
            Ok(v) => report.anomalies = v,
            Err(e) => errors.push(format!("anomalies: {e}")),
        }
        match self.temporal_patterns(table) {
            Ok(v) => report.temporal_patterns = v,
            Err(e) => errors.push(format!("temporal_patterns: {e}")),
        }
        match self.data_quality(table) {
            Ok(v) => report.data_quality = v,
            Err(e) => errors.push(format!("data_quality: {e}")),
        }
        match self.aggregated_metrics(table, file_name, data_source) {
            Ok(v) => report.aggregated_metrics = v,
            Err(e) => errors.push(format!("aggregated_metrics: {e}")),
        }

        if !errors.is_empty() {
            warn!(file = file_name, errors = errors.len(), "analysis finished with errors");
            report.error = Some(errors.join("; "));
        } else {
            info!(file = file_name, "analysis completed");
        }
        report
    }

    /// Descriptive statistics per group and metric. Groups default to the
    /// location identifier; when a grouping column is absent the whole
    /// table is one `all_data` group.
    pub fn basic_statistics(
        &self,
        table: &Table,
        group_by: &[&str],
    ) -> Result<BTreeMap<String, BTreeMap<String, MetricStats>>> {
        let mut results = BTreeMap::new();
        if table.is_empty() {
            warn!("no data provided for statistical analysis");
            return Ok(results);
        }
        let available: Vec<(&str, usize)> = self
            .metrics
            .iter()
            .filter_map(|m| table.column_index(m).map(|col| (*m, col)))
            .collect();
        if available.is_empty() {
            warn!("no metric columns found for analysis");
            return Ok(results);
        }

        for (key, rows) in group_rows(table, group_by) {
            let mut group_stats = BTreeMap::new();
            for &(metric, col) in &available {
                let values: Vec<f64> = rows
                    .iter()
                    .filter_map(|&row| table.rows()[row][col].as_f64())
                    .collect();
                group_stats.insert(metric.to_string(), metric_stats(&values));
            }
            results.insert(key, group_stats);
        }
        Ok(results)
    }

    /// Pearson correlation for every unique unordered metric pair, keyed
    /// `<a>_vs_<b>`. Pairs with undefined correlation are omitted.
    fn correlations(&self, table: &Table) -> Result<BTreeMap<String, f64>> {
        let available: Vec<&str> = self
            .metrics
            .iter()
            .filter(|m| table.has_column(m))
            .copied()
            .collect();
        let mut correlations = BTreeMap::new();
        if available.len() < 2 {
            warn!("need at least 2 metrics for correlation analysis");
            return Ok(correlations);
        }

        for i in 0..available.len() {
            for j in (i + 1)..available.len() {
                let a = table.numeric_column(available[i]);
                let b = table.numeric_column(available[j]);
                let mut xs = Vec::new();
                let mut ys = Vec::new();
                for (x, y) in a.iter().zip(&b) {
                    if let (Some(x), Some(y)) = (x, y) {
                        xs.push(*x);
                        ys.push(*y);
                    }
                }
                if let Some(r) = stats::pearson(&xs, &ys) {
                    correlations.insert(format!("{}_vs_{}", available[i], available[j]), r);
                }
            }
        }
        Ok(correlations)
    }

    /// Z-score and 1.5x IQR anomaly counts per metric with more than 10
    /// samples; metrics at or below the threshold get no entry.
    fn anomalies(&self, table: &Table) -> Result<BTreeMap<String, AnomalySummary>> {
        let mut results = BTreeMap::new();
        for metric in &self.metrics {
            if !table.has_column(metric) {
                continue;
            }
            let values: Vec<f64> = table
                .numeric_column(metric)
                .into_iter()
                .flatten()
                .collect();
            if values.len() <= ANOMALY_MIN_SAMPLES {
                continue;
            }

            let mean = stats::mean(&values);
            let std = stats::std_dev(&values);
            let z_count = if std > 0.0 {
                values
                    .iter()
                    .filter(|v| ((*v - mean) / std).abs() > 3.0)
                    .count()
            } else {
                0
            };

            let q1 = stats::quantile(&values, 0.25);
            let q3 = stats::quantile(&values, 0.75);
            let iqr = q3 - q1;
            let iqr_count = values
                .iter()
                .filter(|&&v| v < q1 - 1.5 * iqr || v > q3 + 1.5 * iqr)
                .count();

            let n = values.len();
            results.insert(
                (*metric).to_string(),
                AnomalySummary {
                    z_score_anomalies: z_count,
                    iqr_anomalies: iqr_count,
                    total_readings: n,
                    anomaly_percentage_zscore: z_count as f64 / n as f64 * 100.0,
                    anomaly_percentage_iqr: iqr_count as f64 / n as f64 * 100.0,
                },
            );
        }
        Ok(results)
    }

    /// Hour-of-day and weekday buckets per metric, with peak/lowest/most
    /// variable hour. Ties go to the earliest hour because buckets are
    /// scanned in ascending hour order.
    fn temporal_patterns(&self, table: &Table) -> Result<BTreeMap<String, TemporalPattern>> {
        let mut results = BTreeMap::new();
        let Some(ts_col) = table.column_index(schema::TIMESTAMP_COLUMN) else {
            warn!("no timestamp column found for temporal analysis");
            return Ok(results);
        };

        for metric in &self.metrics {
            let Some(col) = table.column_index(metric) else {
                continue;
            };
            let mut hourly: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
            let mut daily: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for row in table.rows() {
                let Some(ts) = row[ts_col].as_timestamp() else {
                    continue;
                };
                let Some(value) = row[col].as_f64() else {
                    continue;
                };
                hourly.entry(ts.hour()).or_default().push(value);
                daily
                    .entry(ts.format("%A").to_string())
                    .or_default()
                    .push(value);
            }
            if hourly.is_empty() {
                continue;
            }

            let hourly_patterns: BTreeMap<u32, BucketStats> = hourly
                .iter()
                .map(|(&hour, values)| (hour, bucket_stats(values)))
                .collect();
            let daily_patterns: BTreeMap<String, BucketStats> = daily
                .iter()
                .map(|(day, values)| (day.clone(), bucket_stats(values)))
                .collect();

            // Ascending hour order with strict comparisons: first bucket
            // wins ties.
            let mut peak_hour = 0;
            let mut lowest_hour = 0;
            let mut most_variable_hour = 0;
            let mut best_mean = f64::NEG_INFINITY;
            let mut worst_mean = f64::INFINITY;
            let mut best_std = f64::NEG_INFINITY;
            for (&hour, bucket) in &hourly_patterns {
                if bucket.mean > best_mean {
                    best_mean = bucket.mean;
                    peak_hour = hour;
                }
                if bucket.mean < worst_mean {
                    worst_mean = bucket.mean;
                    lowest_hour = hour;
                }
                if bucket.std > best_std {
                    best_std = bucket.std;
                    most_variable_hour = hour;
                }
            }

            results.insert(
                (*metric).to_string(),
                TemporalPattern {
                    hourly_patterns,
                    daily_patterns,
                    peak_hour,
                    lowest_hour,
                    most_variable_hour,
                },
            );
        }
        Ok(results)
    }

    /// Cell completeness for the whole table and per recognized metric
    /// column.
    fn data_quality(&self, table: &Table) -> Result<DataQualityMetrics> {
        let total_rows = table.n_rows();
        if total_rows == 0 {
            return Ok(DataQualityMetrics::default());
        }

        let total_cells = total_rows * table.n_cols();
        let missing_cells = table.null_count();
        let completeness = (total_cells - missing_cells) as f64 / total_cells as f64 * 100.0;

        let mut column_quality = BTreeMap::new();
        for column in table.columns() {
            if !self.metrics.contains(&column.as_str()) {
                continue;
            }
            let missing = table.column_null_count(column);
            column_quality.insert(
                column.clone(),
                ColumnQuality {
                    completeness: stats::round2(
                        (total_rows - missing) as f64 / total_rows as f64 * 100.0,
                    ),
                    missing_count: missing,
                    data_type: observed_type(table, column),
                },
            );
        }

        Ok(DataQualityMetrics {
            overall_completeness: stats::round2(completeness),
            total_rows,
            total_missing_values: missing_cells,
            column_quality,
        })
    }

    /// Per-(location, metric) records for the persistence layer. Only
    /// metrics with at least one sample are emitted.
    fn aggregated_metrics(
        &self,
        table: &Table,
        file_name: &str,
        data_source: &str,
    ) -> Result<Vec<AggregatedMetricRecord>> {
        let now = Utc::now().naive_utc();
        let grouped = self.basic_statistics(table, &[schema::LOCATION_COLUMN])?;
        let mut records = Vec::new();
        for (location_id, metrics) in grouped {
            for (metric_name, stats) in metrics {
                if stats.count == 0 {
                    continue;
                }
                records.push(AggregatedMetricRecord {
                    location_id: location_id.clone(),
                    metric_name,
                    min_value: stats.min,
                    max_value: stats.max,
                    avg_value: stats.mean,
                    std_value: stats.std,
                    count: stats.count,
                    file_name: file_name.to_string(),
                    data_source: data_source.to_string(),
                    analysis_timestamp: now,
                });
            }
        }
        Ok(records)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Row indices per group key. Falls back to a single `all_data` group when
/// any grouping column is absent.
fn group_rows(table: &Table, group_by: &[&str]) -> BTreeMap<String, Vec<usize>> {
    let cols: Option<Vec<usize>> = group_by
        .iter()
        .map(|name| table.column_index(name))
        .collect();
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    match cols {
        Some(cols) if !cols.is_empty() => {
            for row in 0..table.n_rows() {
                let key = cols
                    .iter()
                    .map(|&col| table.rows()[row][col].display())
                    .collect::<Vec<_>>()
                    .join("_");
                groups.entry(key).or_default().push(row);
            }
        }
        _ => {
            groups.insert("all_data".to_string(), (0..table.n_rows()).collect());
        }
    }
    groups
}

fn metric_stats(values: &[f64]) -> MetricStats {
    if values.is_empty() {
        return MetricStats::default();
    }
    MetricStats {
        count: values.len(),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: stats::mean(values),
        median: stats::median(values),
        std: stats::std_dev(values),
        variance: stats::variance(values),
        percentile_25: stats::quantile(values, 0.25),
        percentile_75: stats::quantile(values, 0.75),
        skewness: stats::skewness(values),
        kurtosis: stats::kurtosis(values),
    }
}

fn bucket_stats(values: &[f64]) -> BucketStats {
    BucketStats {
        mean: stats::round2(stats::mean(values)),
        std: stats::round2(stats::std_dev(values)),
        count: values.len(),
    }
}

/// Storage type of a column as observed from its first non-null cell.
fn observed_type(table: &Table, column: &str) -> String {
    table
        .column_values(column)
        .iter()
        .find(|v| !v.is_null())
        .map_or("null", |v| v.type_name())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> Value {
        Value::Timestamp(
            NaiveDate::from_ymd_opt(2026, 3, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
    }

    /// location_id, timestamp, temperature, humidity.
    fn reading_table(rows: &[(&str, u32, Option<f64>, Option<f64>)]) -> Table {
        let mut table = Table::new(vec![
            "location_id".to_string(),
            "timestamp".to_string(),
            "temperature_celsius".to_string(),
            "humidity_percent".to_string(),
        ]);
        for (loc, hour, temp, humidity) in rows {
            table.push_row(vec![
                Value::Text(loc.to_string()),
                ts(1, *hour),
                temp.map_or(Value::Null, Value::Float),
                humidity.map_or(Value::Null, Value::Float),
            ]);
        }
        table
    }

    fn analyze(table: &Table) -> AnalysisReport {
        Analyzer::new().analyze(table, "readings.csv", "unit_test")
    }

    #[test]
    fn std_and_variance_are_zero_for_single_sample_groups() {
        let table = reading_table(&[("room_a", 1, Some(20.0), Some(40.0))]);
        let report = analyze(&table);
        let stats = &report.basic_statistics["room_a"]["temperature_celsius"];
        assert_eq!(stats.count, 1);
        assert_eq!(stats.std, 0.0);
        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.mean, 20.0);
    }

    #[test]
    fn groups_are_keyed_by_location() {
        let table = reading_table(&[
            ("room_a", 1, Some(20.0), Some(40.0)),
            ("room_b", 2, Some(24.0), Some(42.0)),
        ]);
        let report = analyze(&table);
        assert_eq!(report.basic_statistics.len(), 2);
        assert!(report.basic_statistics.contains_key("room_a"));
        assert!(report.basic_statistics.contains_key("room_b"));
    }

    #[test]
    fn metric_with_no_samples_reports_zeroed_stats() {
        let table = reading_table(&[("room_a", 1, Some(20.0), None)]);
        let report = analyze(&table);
        let stats = &report.basic_statistics["room_a"]["humidity_percent"];
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.max, 0.0);
    }

    #[test]
    fn constant_column_correlation_is_omitted() {
        let table = reading_table(&[
            ("room_a", 1, Some(20.0), Some(40.0)),
            ("room_a", 2, Some(20.0), Some(50.0)),
            ("room_a", 3, Some(20.0), Some(60.0)),
        ]);
        let report = analyze(&table);
        assert!(!report
            .correlations
            .contains_key("temperature_celsius_vs_humidity_percent"));
    }

    #[test]
    fn correlated_columns_report_pearson_r() {
        let table = reading_table(&[
            ("room_a", 1, Some(10.0), Some(20.0)),
            ("room_a", 2, Some(20.0), Some(40.0)),
            ("room_a", 3, Some(30.0), Some(60.0)),
        ]);
        let report = analyze(&table);
        let r = report.correlations["temperature_celsius_vs_humidity_percent"];
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn anomaly_detection_skips_small_samples() {
        // Exactly 10 samples: below the strict threshold.
        let rows: Vec<_> = (0..10)
            .map(|i| ("room_a", i as u32, Some(20.0 + i as f64), Some(40.0)))
            .collect();
        let report = analyze(&reading_table(&rows));
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn anomaly_detection_counts_fence_violations() {
        let mut rows: Vec<_> = (0..10)
            .map(|i| ("room_a", i as u32, Some(10.0), Some(40.0 + i as f64)))
            .collect();
        rows.push(("room_a", 10, Some(100.0), Some(50.0)));
        let report = analyze(&reading_table(&rows));

        let summary = &report.anomalies["temperature_celsius"];
        assert_eq!(summary.total_readings, 11);
        assert_eq!(summary.z_score_anomalies, 1);
        assert_eq!(summary.iqr_anomalies, 1);
        assert!((summary.anomaly_percentage_iqr - 100.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn temporal_patterns_pick_peak_and_lowest_hours() {
        let table = reading_table(&[
            ("room_a", 1, Some(10.0), None),
            ("room_a", 1, Some(10.0), None),
            ("room_a", 2, Some(30.0), None),
        ]);
        let report = analyze(&table);
        let pattern = &report.temporal_patterns["temperature_celsius"];
        assert_eq!(pattern.peak_hour, 2);
        assert_eq!(pattern.lowest_hour, 1);
        // Both hours have zero std; the tie goes to the earliest hour.
        assert_eq!(pattern.most_variable_hour, 1);
        assert_eq!(pattern.hourly_patterns[&1].count, 2);
        assert_eq!(pattern.hourly_patterns[&2].mean, 30.0);
        assert!(pattern.daily_patterns.contains_key("Sunday"));
    }

    #[test]
    fn temporal_patterns_need_a_timestamp_column() {
        let mut table = Table::new(vec![
            "location_id".to_string(),
            "temperature_celsius".to_string(),
        ]);
        table.push_row(vec![Value::Text("room_a".to_string()), Value::Float(20.0)]);
        let report = analyze(&table);
        assert!(report.temporal_patterns.is_empty());
        assert!(report.error.is_none());
    }

    #[test]
    fn overall_completeness_is_rounded_to_two_decimals() {
        // 10 columns x 10 rows = 100 cells, 10 of them null.
        let columns: Vec<String> = (0..10).map(|i| format!("col_{i}")).collect();
        let mut table = Table::new(columns);
        for _ in 0..10 {
            let mut cells = vec![Value::Float(1.0); 10];
            cells[0] = Value::Null;
            table.push_row(cells);
        }
        let report = analyze(&table);
        assert_eq!(report.data_quality.overall_completeness, 90.0);
        assert_eq!(report.data_quality.total_missing_values, 10);
        assert_eq!(report.data_quality.total_rows, 10);
    }

    #[test]
    fn column_quality_reports_type_and_missing_counts() {
        let table = reading_table(&[
            ("room_a", 1, Some(20.0), None),
            ("room_a", 2, Some(21.0), Some(40.0)),
        ]);
        let report = analyze(&table);
        let quality = &report.data_quality.column_quality["humidity_percent"];
        assert_eq!(quality.missing_count, 1);
        assert_eq!(quality.completeness, 50.0);
        assert_eq!(quality.data_type, "float");
    }

    #[test]
    fn aggregated_metrics_skip_empty_and_carry_provenance() {
        let table = reading_table(&[
            ("room_a", 1, Some(20.0), None),
            ("room_a", 2, Some(22.0), None),
        ]);
        let report = analyze(&table);
        assert_eq!(report.aggregated_metrics.len(), 1);
        let record = &report.aggregated_metrics[0];
        assert_eq!(record.metric_name, "temperature_celsius");
        assert_eq!(record.location_id, "room_a");
        assert_eq!(record.count, 2);
        assert_eq!(record.avg_value, 21.0);
        assert_eq!(record.file_name, "readings.csv");
        assert_eq!(record.data_source, "unit_test");
    }

    #[test]
    fn empty_table_yields_empty_sections_without_error() {
        let table = Table::new(vec!["location_id".to_string()]);
        let report = analyze(&table);
        assert!(report.basic_statistics.is_empty());
        assert!(report.aggregated_metrics.is_empty());
        assert!(report.error.is_none());
    }
}
