use chrono::{Datelike, Timelike, Utc};
use tracing::{debug, info, warn};

use crate::models::TransformSummary;
use crate::schema;
use crate::stats;
use crate::table::{Table, Value};

/// How many consecutive missing values linear interpolation will fill;
/// longer runs fall back to forward/backward fill.
const INTERPOLATION_LIMIT: usize = 5;

/// Stateless table transformer. Never drops or reorders rows: the output
/// corresponds 1:1 by index with the input.
pub struct Transformer;

impl Transformer {
    pub fn new() -> Self {
        Self
    }

    /// Full transformation pipeline: canonicalize names, derive columns,
    /// normalize units, cap outliers, interpolate gaps, stamp metadata.
    pub fn transform(
        &self,
        table: &Table,
        file_name: &str,
        data_source: &str,
    ) -> (Table, TransformSummary) {
        info!(file = file_name, "starting transformation");
        let original_missing = tracked_missing(table);
        let original_shape = (table.n_rows(), table.n_cols());

        let mut out = table.clone();
        out.rename_columns(canonicalize_name);
        add_derived_columns(&mut out);
        normalize_units(&mut out);
        cap_outliers(&mut out);
        interpolate_missing(&mut out);
        add_metadata(&mut out, file_name, data_source);

        let summary = TransformSummary {
            original_shape,
            transformed_shape: (out.n_rows(), out.n_cols()),
            columns_added: out.n_cols() - original_shape.1,
            missing_values_reduced: original_missing as i64 - tracked_missing(&out) as i64,
            transformation_timestamp: Utc::now().to_rfc3339(),
        };
        info!(
            file = file_name,
            rows = out.n_rows(),
            columns = out.n_cols(),
            filled = summary.missing_values_reduced,
            "transformation completed"
        );
        (out, summary)
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase, trim, spaces/hyphens and other punctuation to single
/// underscores, no leading/trailing underscore.
fn canonicalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_underscore = false;
    for c in lowered.trim().chars() {
        let mapped = if c.is_alphanumeric() { c } else { '_' };
        if mapped == '_' {
            if !last_underscore && !out.is_empty() {
                out.push('_');
            }
            last_underscore = true;
        } else {
            out.push(mapped);
            last_underscore = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

fn tracked_missing(table: &Table) -> usize {
    schema::TRACKED_COLUMNS
        .iter()
        .map(|col| table.column_null_count(col))
        .sum()
}

fn add_derived_columns(table: &mut Table) {
    let n = table.n_rows();

    // Per-row completeness over the environmental columns actually present.
    let env_present: Vec<usize> = schema::ENV_COLUMNS
        .iter()
        .filter_map(|col| table.column_index(col))
        .collect();
    if !env_present.is_empty() {
        let scores: Vec<Value> = (0..n)
            .map(|row| {
                let non_null = env_present
                    .iter()
                    .filter(|&&col| !table.rows()[row][col].is_null())
                    .count();
                Value::Float(non_null as f64 / env_present.len() as f64)
            })
            .collect();
        table.add_column("data_quality_score", scores);
    }

    let risk_inputs = ["stress_level", "sleep_hours", "mood_score"];
    if risk_inputs.iter().all(|col| table.has_column(col)) {
        let stress = table.numeric_column("stress_level");
        let sleep = table.numeric_column("sleep_hours");
        let mood = table.numeric_column("mood_score");
        let risk: Vec<Value> = (0..n)
            .map(|row| {
                Value::Float(mental_health_risk(
                    stress[row].unwrap_or(0.0),
                    sleep[row].unwrap_or(8.0),
                    mood[row].unwrap_or(3.0),
                ))
            })
            .collect();
        table.add_column("mental_health_risk", risk);
    }

    let comfort_inputs = ["temperature_celsius", "humidity_percent", "noise_level_db"];
    if comfort_inputs.iter().all(|col| table.has_column(col)) {
        let temp = table.numeric_column("temperature_celsius");
        let humidity = table.numeric_column("humidity_percent");
        let noise = table.numeric_column("noise_level_db");
        let comfort: Vec<Value> = (0..n)
            .map(|row| {
                Value::Float(comfort_index(
                    temp[row].unwrap_or(22.0),
                    humidity[row].unwrap_or(50.0),
                    noise[row].unwrap_or(50.0),
                ))
            })
            .collect();
        table.add_column("comfort_index", comfort);
    }

    if table.has_column(schema::TIMESTAMP_COLUMN) {
        let timestamps: Vec<_> = table
            .column_values(schema::TIMESTAMP_COLUMN)
            .iter()
            .map(|v| v.as_timestamp())
            .collect();
        let hours = timestamps
            .iter()
            .map(|ts| ts.map_or(Value::Null, |t| Value::Int(i64::from(t.hour()))))
            .collect();
        let days = timestamps
            .iter()
            .map(|ts| ts.map_or(Value::Null, |t| Value::Text(t.format("%A").to_string())))
            .collect();
        let months = timestamps
            .iter()
            .map(|ts| ts.map_or(Value::Null, |t| Value::Int(i64::from(t.month()))))
            .collect();
        table.add_column("hour", hours);
        table.add_column("day_of_week", days);
        table.add_column("month", months);
    }
}

/// Risk in [0, 1] from stress (0-100, higher is worse), sleep hours
/// (8 is neutral) and mood score (3 is neutral).
fn mental_health_risk(stress: f64, sleep: f64, mood: f64) -> f64 {
    let stress_risk = (stress / 100.0).clamp(0.0, 1.0);
    let sleep_risk = ((8.0 - sleep) / 8.0).max(0.0);
    let mood_risk = ((3.0 - mood) / 3.0).max(0.0);
    (stress_risk + sleep_risk + mood_risk) / 3.0
}

/// Comfort in [0, 1]; ideal conditions are 22 degrees C, 50% humidity and
/// silence.
fn comfort_index(temp: f64, humidity: f64, noise: f64) -> f64 {
    let temp_comfort = (1.0 - (temp - 22.0).abs() / 10.0).clamp(0.0, 1.0);
    let humidity_comfort = (1.0 - (humidity - 50.0).abs() / 50.0).clamp(0.0, 1.0);
    let noise_comfort = ((70.0 - noise) / 70.0).clamp(0.0, 1.0);
    (temp_comfort + humidity_comfort + noise_comfort) / 3.0
}

/// Column-wide unit heuristics. A mean temperature above 50 is read as
/// Fahrenheit; a humidity maximum at or below 1 is read as a fraction.
fn normalize_units(table: &mut Table) {
    if let Some(col) = table.column_index("temperature_celsius") {
        let values: Vec<f64> = table
            .rows()
            .iter()
            .filter_map(|row| row[col].as_f64())
            .collect();
        if !values.is_empty() && stats::mean(&values) > 50.0 {
            info!("temperature column looks like Fahrenheit, converting to Celsius");
            for row in 0..table.n_rows() {
                if let Some(f) = table.rows()[row][col].as_f64() {
                    table.set(row, col, Value::Float((f - 32.0) * 5.0 / 9.0));
                }
            }
        }
    }

    if let Some(col) = table.column_index("humidity_percent") {
        let max = table
            .rows()
            .iter()
            .filter_map(|row| row[col].as_f64())
            .fold(f64::NEG_INFINITY, f64::max);
        if max.is_finite() && max <= 1.0 {
            info!("humidity column looks like a 0-1 fraction, converting to percent");
            for row in 0..table.n_rows() {
                if let Some(h) = table.rows()[row][col].as_f64() {
                    table.set(row, col, Value::Float(h * 100.0));
                }
            }
        }
    }
}

/// Winsorizes each recognized metric at the 3x IQR fences, deliberately
/// wider than the classic 1.5x fence to tolerate sensor noise. Values are
/// clipped, never removed.
fn cap_outliers(table: &mut Table) {
    for name in schema::METRIC_COLUMNS {
        let Some(col) = table.column_index(name) else {
            continue;
        };
        let values: Vec<f64> = table
            .rows()
            .iter()
            .filter_map(|row| row[col].as_f64())
            .collect();
        if values.is_empty() {
            continue;
        }
        let q1 = stats::quantile(&values, 0.25);
        let q3 = stats::quantile(&values, 0.75);
        let iqr = q3 - q1;
        let lower = q1 - 3.0 * iqr;
        let upper = q3 + 3.0 * iqr;

        let mut capped = 0usize;
        for row in 0..table.n_rows() {
            if let Some(v) = table.rows()[row][col].as_f64() {
                if v < lower {
                    table.set(row, col, Value::Float(lower));
                    capped += 1;
                } else if v > upper {
                    table.set(row, col, Value::Float(upper));
                    capped += 1;
                }
            }
        }
        if capped > 0 {
            warn!(column = name, count = capped, "capped extreme outliers");
        }
    }
}

/// Fills gaps in the environmental columns: linear interpolation over a
/// timestamp-sorted view for runs of up to 5 missing values, then forward
/// and backward fill for what remains. The caller's row order is untouched;
/// only the fill pass walks rows in time order.
fn interpolate_missing(table: &mut Table) {
    let order = time_sorted_order(table);

    for name in schema::INTERPOLATE_COLUMNS {
        let Some(col) = table.column_index(name) else {
            continue;
        };
        let mut values: Vec<Option<f64>> = order
            .iter()
            .map(|&row| table.rows()[row][col].as_f64())
            .collect();
        let missing_before = values.iter().filter(|v| v.is_none()).count();
        if missing_before == 0 {
            continue;
        }
        debug!(column = name, missing = missing_before, "interpolating gaps");

        linear_fill(&mut values, INTERPOLATION_LIMIT);
        forward_fill(&mut values);
        backward_fill(&mut values);

        for (pos, &row) in order.iter().enumerate() {
            if table.rows()[row][col].is_null() {
                if let Some(v) = values[pos] {
                    table.set(row, col, Value::Float(v));
                }
            }
        }
    }
}

/// Row indices sorted by timestamp, nulls last; stable so equal timestamps
/// keep their input order. Identity order when there is no timestamp
/// column.
fn time_sorted_order(table: &Table) -> Vec<usize> {
    let mut order: Vec<usize> = (0..table.n_rows()).collect();
    if let Some(col) = table.column_index(schema::TIMESTAMP_COLUMN) {
        order.sort_by(|&a, &b| {
            let ta = table.rows()[a][col].as_timestamp();
            let tb = table.rows()[b][col].as_timestamp();
            match (ta, tb) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
    }
    order
}

/// Linearly interpolates runs of missing values bounded by known values on
/// both sides, filling at most `limit` cells per run from the left.
fn linear_fill(values: &mut [Option<f64>], limit: usize) {
    let len = values.len();
    let mut i = 0;
    while i < len {
        if values[i].is_some() {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i;
        while end < len && values[end].is_none() {
            end += 1;
        }
        if start > 0 && end < len {
            let left = values[start - 1].unwrap_or_default();
            let right = values[end].unwrap_or_default();
            let gap = end - start;
            let step = (right - left) / (gap + 1) as f64;
            for k in 0..gap.min(limit) {
                values[start + k] = Some(left + step * (k + 1) as f64);
            }
        }
        i = end;
    }
}

fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for value in values.iter_mut() {
        match value {
            Some(v) => last = Some(*v),
            None => *value = last,
        }
    }
}

fn backward_fill(values: &mut [Option<f64>]) {
    let mut next = None;
    for value in values.iter_mut().rev() {
        match value {
            Some(v) => next = Some(*v),
            None => *value = next,
        }
    }
}

fn add_metadata(table: &mut Table, file_name: &str, data_source: &str) {
    let n = table.n_rows();
    let now = Utc::now().naive_utc();
    table.add_column("file_name", vec![Value::Text(file_name.to_string()); n]);
    table.add_column("data_source", vec![Value::Text(data_source.to_string()); n]);
    table.add_column("processing_timestamp", vec![Value::Timestamp(now); n]);
    table.add_column(
        "data_version",
        vec![Value::Text(schema::SCHEMA_VERSION.to_string()); n],
    );
}
