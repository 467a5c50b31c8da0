use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::schema::{self, MetricRange};
use crate::table::{Table, Value};

/// Explicit validation result. No exception-style control flow: the caller
/// branches on the variant, and quarantining the file is its move to make.
/// `rejected` carries the discarded rows in both variants so the caller can
/// write them to the invalid-data audit log; structural failures reject
/// before any rows are judged and carry an empty table.
#[derive(Debug)]
pub enum ValidationOutcome {
    /// At least one row survived and no more than half were invalid.
    Accepted {
        table: Table,
        rejected: Table,
        violations: Vec<String>,
    },
    /// The file as a whole cannot be trusted; `reasons` feed the manifest.
    Quarantined {
        reasons: Vec<String>,
        rejected: Table,
    },
}

/// Stateless row/file validator with fixed range rules. Construct per call
/// site; it holds nothing but the rule tables.
pub struct Validator {
    rules: Vec<(&'static str, MetricRange)>,
    required: Vec<&'static str>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: schema::validation_ranges(),
            required: schema::REQUIRED_COLUMNS.to_vec(),
        }
    }

    /// Runs the full validation sequence over one table: empty-row removal,
    /// structural check, type coercion, required-field completeness, range
    /// checks, and the >50%-invalid aggregate decision.
    pub fn validate(&self, table: &Table) -> ValidationOutcome {
        let mut violations = Vec::new();

        let mut cleaned = drop_empty_rows(table);
        let removed = table.n_rows() - cleaned.n_rows();
        if removed > 0 {
            info!(removed, "removed completely empty rows");
        }
        if cleaned.is_empty() {
            return ValidationOutcome::Quarantined {
                reasons: vec!["No valid data remaining after removing empty rows".to_string()],
                rejected: Table::new(table.columns().to_vec()),
            };
        }

        let structure_errors = self.check_structure(&cleaned);
        if !structure_errors.is_empty() {
            return ValidationOutcome::Quarantined {
                reasons: structure_errors,
                rejected: Table::new(table.columns().to_vec()),
            };
        }

        self.coerce_types(&mut cleaned, &mut violations);

        let mut invalid = self.required_field_mask(&cleaned, &mut violations);
        let range_invalid = self.range_mask(&cleaned, &mut violations);
        for (flag, range_flag) in invalid.iter_mut().zip(&range_invalid) {
            *flag |= range_flag;
        }

        let total = cleaned.n_rows();
        let invalid_count = invalid.iter().filter(|&&flag| flag).count();
        let valid_count = total - invalid_count;
        info!(valid_count, total, "validation row summary");

        let rejected = cleaned.filter_rows(&invalid);

        // Strictly more than half invalid quarantines the whole file, even
        // though some rows were individually fine.
        if invalid_count * 2 > total {
            violations.push(format!(
                "More than 50% of rows invalid ({invalid_count}/{total})"
            ));
            return ValidationOutcome::Quarantined {
                reasons: violations,
                rejected,
            };
        }

        let keep: Vec<bool> = invalid.iter().map(|&flag| !flag).collect();
        ValidationOutcome::Accepted {
            table: cleaned.filter_rows(&keep),
            rejected,
            violations,
        }
    }

    /// Structural check: every required column present, plus at least one
    /// environmental column. Failure here is fatal for the whole file.
    fn check_structure(&self, table: &Table) -> Vec<String> {
        let mut errors = Vec::new();

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|col| !table.has_column(col))
            .copied()
            .collect();
        if !missing.is_empty() {
            errors.push(format!("Missing required columns: [{}]", missing.join(", ")));
        }

        let has_env = schema::ENV_COLUMNS.iter().any(|col| table.has_column(col));
        if !has_env {
            errors.push("No environmental data columns found".to_string());
        }

        errors
    }

    /// Coerces the timestamp column and all declared numeric columns in
    /// place. Unparseable cells become null; they are counted, not fatal.
    fn coerce_types(&self, table: &mut Table, violations: &mut Vec<String>) {
        if let Some(col) = table.column_index(schema::TIMESTAMP_COLUMN) {
            let mut bad = 0usize;
            for row in 0..table.n_rows() {
                let parsed = match &table.rows()[row][col] {
                    Value::Text(s) => match parse_timestamp(s) {
                        Some(ts) => Value::Timestamp(ts),
                        None => {
                            bad += 1;
                            Value::Null
                        }
                    },
                    other => other.clone(),
                };
                table.set(row, col, parsed);
            }
            if bad > 0 {
                violations.push(format!("Found {bad} invalid timestamp values"));
            }
        }

        for name in schema::numeric_columns() {
            let Some(col) = table.column_index(name) else {
                continue;
            };
            let mut bad = 0usize;
            for row in 0..table.n_rows() {
                let parsed = match &table.rows()[row][col] {
                    Value::Text(s) => match parse_number(s) {
                        Some(value) => value,
                        None => {
                            bad += 1;
                            Value::Null
                        }
                    },
                    other => other.clone(),
                };
                table.set(row, col, parsed);
            }
            if bad > 0 {
                warn!(column = name, count = bad, "non-numeric values converted to null");
            }
        }
    }

    /// Marks rows missing any required value. The location identifier also
    /// rejects empty strings and the literal text "nan". Rows whose
    /// available environmental readings are all null are invalid too.
    fn required_field_mask(&self, table: &Table, violations: &mut Vec<String>) -> Vec<bool> {
        let n = table.n_rows();
        let mut invalid = vec![false; n];

        for name in &self.required {
            match table.column_index(name) {
                Some(col) => {
                    let mut count = 0usize;
                    for (row, flags) in invalid.iter_mut().enumerate() {
                        let cell = &table.rows()[row][col];
                        let missing = if *name == schema::LOCATION_COLUMN {
                            cell.is_null()
                                || cell
                                    .as_text()
                                    .is_some_and(|s| s.is_empty() || s.eq_ignore_ascii_case("nan"))
                        } else {
                            cell.is_null()
                        };
                        if missing {
                            *flags = true;
                            count += 1;
                        }
                    }
                    if count > 0 {
                        violations.push(format!("Found {count} rows with missing {name}"));
                    }
                }
                None => {
                    // Unreachable past the structural check, but verified
                    // independently: an absent required column invalidates
                    // every row, which trips the aggregate quarantine rule.
                    violations
                        .push(format!("Required column '{name}' is missing from dataset"));
                    invalid.iter_mut().for_each(|flag| *flag = true);
                }
            }
        }

        let available_env: Vec<usize> = schema::ENV_COLUMNS
            .iter()
            .filter_map(|col| table.column_index(col))
            .collect();
        if !available_env.is_empty() {
            let mut count = 0usize;
            for (row, flag) in invalid.iter_mut().enumerate() {
                if *flag {
                    continue;
                }
                let all_null = available_env
                    .iter()
                    .all(|&col| table.rows()[row][col].is_null());
                if all_null {
                    *flag = true;
                    count += 1;
                }
            }
            if count > 0 {
                violations.push(format!(
                    "Found {count} rows with all environmental readings missing"
                ));
            }
        }

        invalid
    }

    /// Marks rows with any non-null metric outside its inclusive range.
    /// Violations across metrics are unioned per row.
    fn range_mask(&self, table: &Table, violations: &mut Vec<String>) -> Vec<bool> {
        let mut invalid = vec![false; table.n_rows()];

        for (name, range) in &self.rules {
            let Some(col) = table.column_index(name) else {
                continue;
            };
            let mut count = 0usize;
            for (row, flag) in invalid.iter_mut().enumerate() {
                if let Some(value) = table.rows()[row][col].as_f64() {
                    if !range.contains(value) {
                        *flag = true;
                        count += 1;
                    }
                }
            }
            if count > 0 {
                violations.push(format!(
                    "Found {count} {name} readings out of range ({} to {})",
                    range.min, range.max
                ));
            }
        }

        invalid
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

fn drop_empty_rows(table: &Table) -> Table {
    let keep: Vec<bool> = table
        .rows()
        .iter()
        .map(|row| row.iter().any(|v| !v.is_null()))
        .collect();
    table.filter_rows(&keep)
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    const FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(Value::Int(v));
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite()).map(Value::Float)
}
