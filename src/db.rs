use anyhow::Context;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use tracing::info;

use crate::models::AggregatedMetricRecord;
use crate::schema;
use crate::table::Table;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Inserts every row of an enriched table into the raw-readings store, in
/// one transaction.
pub async fn insert_raw(
    pool: &PgPool,
    table: &Table,
    file_name: &str,
    data_source: &str,
) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await.context("failed to open transaction")?;
    let mut inserted = 0u64;

    for row in 0..table.n_rows() {
        let reading_at = ts_cell(table, row, schema::TIMESTAMP_COLUMN)
            .with_context(|| format!("row {row} has no parsed timestamp"))?;
        sqlx::query(
            r#"
            INSERT INTO sensor_pipeline.raw_sensor_readings
            (location_id, reading_at, temperature_celsius, humidity_percent,
             air_quality_index, noise_level_db, lighting_lux, crowd_density,
             stress_level, sleep_hours, mood_score, mental_health_status,
             file_name, data_source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(text_cell(table, row, schema::LOCATION_COLUMN).unwrap_or_default())
        .bind(reading_at)
        .bind(f64_cell(table, row, "temperature_celsius"))
        .bind(f64_cell(table, row, "humidity_percent"))
        .bind(i32_cell(table, row, "air_quality_index"))
        .bind(f64_cell(table, row, "noise_level_db"))
        .bind(f64_cell(table, row, "lighting_lux"))
        .bind(i32_cell(table, row, "crowd_density"))
        .bind(i32_cell(table, row, "stress_level"))
        .bind(f64_cell(table, row, "sleep_hours"))
        .bind(f64_cell(table, row, "mood_score"))
        .bind(i32_cell(table, row, schema::STATUS_COLUMN))
        .bind(file_name)
        .bind(data_source)
        .execute(&mut *tx)
        .await?;
        inserted += 1;
    }

    tx.commit().await.context("failed to commit raw readings")?;
    info!(count = inserted, file = file_name, "inserted raw readings");
    Ok(inserted)
}

/// Inserts the flattened per-(location, metric) statistics, in one
/// transaction.
pub async fn insert_aggregated(
    pool: &PgPool,
    records: &[AggregatedMetricRecord],
) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await.context("failed to open transaction")?;

    for record in records {
        sqlx::query(
            r#"
            INSERT INTO sensor_pipeline.aggregated_metrics
            (location_id, data_source, file_name, metric_name,
             min_value, max_value, avg_value, std_value, sample_count, analyzed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&record.location_id)
        .bind(&record.data_source)
        .bind(&record.file_name)
        .bind(&record.metric_name)
        .bind(record.min_value)
        .bind(record.max_value)
        .bind(record.avg_value)
        .bind(record.std_value)
        .bind(record.count as i32)
        .bind(record.analysis_timestamp)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await.context("failed to commit aggregated metrics")?;
    let inserted = records.len() as u64;
    info!(count = inserted, "inserted aggregated metrics");
    Ok(inserted)
}

fn f64_cell(table: &Table, row: usize, column: &str) -> Option<f64> {
    table.cell(row, column).and_then(|v| v.as_f64())
}

fn i32_cell(table: &Table, row: usize, column: &str) -> Option<i32> {
    f64_cell(table, row, column).map(|v| v as i32)
}

fn text_cell(table: &Table, row: usize, column: &str) -> Option<String> {
    table
        .cell(row, column)
        .and_then(|v| v.as_text().map(str::to_string))
}

fn ts_cell(table: &Table, row: usize, column: &str) -> Option<NaiveDateTime> {
    table.cell(row, column).and_then(|v| v.as_timestamp())
}
