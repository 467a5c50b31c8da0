use std::collections::HashMap;

use chrono::NaiveDateTime;

/// A single cell in a table. Readings arrive as text and are coerced to
/// typed values during validation; `Null` marks missing or unparseable data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. `Int` widens to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Display form used for group keys and log output.
    pub fn display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Text(s) => s.clone(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Timestamp(ts) => ts.to_string(),
        }
    }
}

/// An in-memory table: named columns over row-major cells. Each pipeline
/// stage consumes one table and produces a new one; row order is preserved
/// unless a stage documents otherwise.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            columns,
            index,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Appends a row. Short rows are padded with nulls so every row matches
    /// the column count; extra cells are dropped.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[col])
    }

    pub fn set(&mut self, row: usize, col: usize, value: Value) {
        self.rows[row][col] = value;
    }

    /// All values of one column, in row order. Empty when the column is
    /// absent.
    pub fn column_values(&self, name: &str) -> Vec<&Value> {
        match self.column_index(name) {
            Some(col) => self.rows.iter().map(|r| &r[col]).collect(),
            None => Vec::new(),
        }
    }

    /// Numeric view of one column, `None` per non-numeric cell.
    pub fn numeric_column(&self, name: &str) -> Vec<Option<f64>> {
        match self.column_index(name) {
            Some(col) => self.rows.iter().map(|r| r[col].as_f64()).collect(),
            None => Vec::new(),
        }
    }

    /// Appends a new column. `values` must have one entry per row.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.index.insert(name.to_string(), self.columns.len());
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Renames columns through `rename`, rebuilding the name index.
    pub fn rename_columns<F>(&mut self, rename: F)
    where
        F: Fn(&str) -> String,
    {
        self.columns = self.columns.iter().map(|c| rename(c)).collect();
        self.index = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
    }

    /// New table containing the rows where `keep` is true, in order.
    pub fn filter_rows(&self, keep: &[bool]) -> Table {
        debug_assert_eq!(keep.len(), self.rows.len());
        let mut out = Table::new(self.columns.clone());
        for (row, &keep_row) in self.rows.iter().zip(keep) {
            if keep_row {
                out.rows.push(row.clone());
            }
        }
        out
    }

    /// Total null cells across the whole table.
    pub fn null_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().filter(|v| v.is_null()).count())
            .sum()
    }

    /// Null cells in one column; 0 when the column is absent.
    pub fn column_null_count(&self, name: &str) -> usize {
        self.column_values(name)
            .iter()
            .filter(|v| v.is_null())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(vec!["a".to_string(), "b".to_string()]);
        table.push_row(vec![Value::Int(1), Value::Float(2.5)]);
        table.push_row(vec![Value::Null, Value::Text("x".to_string())]);
        table
    }

    #[test]
    fn push_row_pads_short_rows() {
        let mut table = Table::new(vec!["a".to_string(), "b".to_string()]);
        table.push_row(vec![Value::Int(1)]);
        assert_eq!(table.cell(0, "b"), Some(&Value::Null));
    }

    #[test]
    fn numeric_column_widens_ints() {
        let table = sample();
        assert_eq!(table.numeric_column("a"), vec![Some(1.0), None]);
    }

    #[test]
    fn filter_rows_keeps_order() {
        let table = sample();
        let kept = table.filter_rows(&[false, true]);
        assert_eq!(kept.n_rows(), 1);
        assert_eq!(kept.cell(0, "b"), Some(&Value::Text("x".to_string())));
    }

    #[test]
    fn add_column_extends_every_row() {
        let mut table = sample();
        table.add_column("c", vec![Value::Float(1.0), Value::Float(2.0)]);
        assert_eq!(table.n_cols(), 3);
        assert_eq!(table.cell(1, "c"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn null_counts() {
        let table = sample();
        assert_eq!(table.null_count(), 1);
        assert_eq!(table.column_null_count("a"), 1);
        assert_eq!(table.column_null_count("missing"), 0);
    }
}
