use std::path::Path;

use tracing::info;

use crate::table::{Table, Value};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to read csv record {record} in {path}: {source}")]
    Record {
        path: String,
        record: usize,
        source: csv::Error,
    },
    #[error("{path} has no header row")]
    MissingHeader { path: String },
}

/// Reads a CSV file into a table. Cells arrive as text; empty cells become
/// null. Type coercion is the validator's job.
pub fn read_csv(path: &Path) -> Result<Table, IngestError> {
    let path_str = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(source) => IngestError::Open {
                path: path_str.clone(),
                source,
            },
            _ => IngestError::MissingHeader {
                path: path_str.clone(),
            },
        })?;

    let headers = reader
        .headers()
        .map_err(|_| IngestError::MissingHeader {
            path: path_str.clone(),
        })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    if headers.is_empty() {
        return Err(IngestError::MissingHeader { path: path_str });
    }

    let mut table = Table::new(headers);
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|source| IngestError::Record {
            path: path_str.clone(),
            record: i + 1,
            source,
        })?;
        let row = record
            .iter()
            .map(|cell| {
                let cell = cell.trim();
                if cell.is_empty() {
                    Value::Null
                } else {
                    Value::Text(cell.to_string())
                }
            })
            .collect();
        table.push_row(row);
    }

    info!(rows = table.n_rows(), columns = table.n_cols(), file = %path_str, "loaded csv");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sensor-ingest-test-{}-{}.csv",
            std::process::id(),
            contents.len()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_headers_and_rows() {
        let path = write_temp("location_id,temperature_celsius\nroom_a,21.5\nroom_b,\n");
        let table = read_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.columns(), ["location_id", "temperature_celsius"]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(
            table.cell(0, "temperature_celsius"),
            Some(&Value::Text("21.5".to_string()))
        );
        assert_eq!(table.cell(1, "temperature_celsius"), Some(&Value::Null));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = read_csv(Path::new("/nonexistent/readings.csv")).unwrap_err();
        assert!(matches!(err, IngestError::Open { .. }));
    }
}
