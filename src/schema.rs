//! Fixed schema descriptor for the sensor dataset: recognized column names,
//! the required-field set, and the per-metric validation ranges. All three
//! pipeline stages consult this module instead of carrying their own column
//! lists.

pub const LOCATION_COLUMN: &str = "location_id";
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const STATUS_COLUMN: &str = "mental_health_status";

/// The nine recognized sensor metrics.
pub const METRIC_COLUMNS: [&str; 9] = [
    "temperature_celsius",
    "humidity_percent",
    "air_quality_index",
    "noise_level_db",
    "lighting_lux",
    "crowd_density",
    "stress_level",
    "sleep_hours",
    "mood_score",
];

/// The environmental family. At least one of these must exist in a file,
/// and a row with all of them null carries no usable reading.
pub const ENV_COLUMNS: [&str; 5] = [
    "temperature_celsius",
    "humidity_percent",
    "air_quality_index",
    "noise_level_db",
    "lighting_lux",
];

/// Columns that must be present and non-null in every surviving row.
/// Humidity is deliberately not required.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "location_id",
    "timestamp",
    "stress_level",
    "sleep_hours",
    "mood_score",
    "mental_health_status",
    "noise_level_db",
    "lighting_lux",
    "crowd_density",
    "temperature_celsius",
];

/// Environmental columns eligible for time-based interpolation.
pub const INTERPOLATE_COLUMNS: [&str; 5] = ENV_COLUMNS;

/// Columns tracked by the transform summary when reporting how many missing
/// values were filled.
pub const TRACKED_COLUMNS: [&str; 8] = [
    "temperature_celsius",
    "humidity_percent",
    "air_quality_index",
    "noise_level_db",
    "lighting_lux",
    "stress_level",
    "sleep_hours",
    "mood_score",
];

pub const SCHEMA_VERSION: &str = "1.0";

/// Inclusive validation range for one metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Fixed range rules, one per numeric column subject to range checks.
pub fn validation_ranges() -> Vec<(&'static str, MetricRange)> {
    vec![
        ("temperature_celsius", MetricRange { min: -50.0, max: 50.0 }),
        ("humidity_percent", MetricRange { min: 0.0, max: 100.0 }),
        ("air_quality_index", MetricRange { min: 0.0, max: 500.0 }),
        ("noise_level_db", MetricRange { min: 0.0, max: 150.0 }),
        ("lighting_lux", MetricRange { min: 0.0, max: 100_000.0 }),
        ("crowd_density", MetricRange { min: 0.0, max: 1_000.0 }),
        ("stress_level", MetricRange { min: 0.0, max: 100.0 }),
        ("sleep_hours", MetricRange { min: 0.0, max: 24.0 }),
        ("mood_score", MetricRange { min: 0.0, max: 5.0 }),
        (STATUS_COLUMN, MetricRange { min: 0.0, max: 1.0 }),
    ]
}

/// Columns coerced to numeric during validation.
pub fn numeric_columns() -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = METRIC_COLUMNS.to_vec();
    columns.push(STATUS_COLUMN);
    columns
}
