use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Descriptive statistics for one metric within one group. A metric with
/// zero samples reports the all-zero structure rather than being omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub variance: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalySummary {
    pub z_score_anomalies: usize,
    pub iqr_anomalies: usize,
    pub total_readings: usize,
    pub anomaly_percentage_zscore: f64,
    pub anomaly_percentage_iqr: f64,
}

/// Mean/std/count for one temporal bucket (an hour of day or a weekday).
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemporalPattern {
    pub hourly_patterns: BTreeMap<u32, BucketStats>,
    pub daily_patterns: BTreeMap<String, BucketStats>,
    pub peak_hour: u32,
    pub lowest_hour: u32,
    pub most_variable_hour: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnQuality {
    pub completeness: f64,
    pub missing_count: usize,
    pub data_type: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DataQualityMetrics {
    pub overall_completeness: f64,
    pub total_rows: usize,
    pub total_missing_values: usize,
    pub column_quality: BTreeMap<String, ColumnQuality>,
}

/// Flattened per-(location, metric) statistics in the shape the persistence
/// layer stores.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedMetricRecord {
    pub location_id: String,
    pub metric_name: String,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_value: f64,
    pub std_value: f64,
    pub count: usize,
    pub file_name: String,
    pub data_source: String,
    pub analysis_timestamp: NaiveDateTime,
}

/// Full analysis output for one file. `error` collects the text of any
/// sub-analysis failure; the surviving sections are still populated.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub file_name: String,
    pub data_source: String,
    pub analysis_timestamp: String,
    pub basic_statistics: BTreeMap<String, BTreeMap<String, MetricStats>>,
    pub correlations: BTreeMap<String, f64>,
    pub anomalies: BTreeMap<String, AnomalySummary>,
    pub temporal_patterns: BTreeMap<String, TemporalPattern>,
    pub data_quality: DataQualityMetrics,
    pub aggregated_metrics: Vec<AggregatedMetricRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Observability summary handed back with every transform.
#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    pub original_shape: (usize, usize),
    pub transformed_shape: (usize, usize),
    pub columns_added: usize,
    pub missing_values_reduced: i64,
    pub transformation_timestamp: String,
}
