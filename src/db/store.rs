use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::StoredReading;
use crate::protocol::ReadingPayload;

/// Persistence gateway over the `sensor_readings` table.
///
/// Owns query execution; the pool itself is created in [`crate::db`] and
/// injected here so handlers never touch SQL directly.
#[derive(Clone)]
pub struct ReadingStore {
    pool: SqlitePool,
}

impl ReadingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one normalized reading with its server-assigned timestamp and
    /// return the stored row.
    pub async fn insert(
        &self,
        reading: &ReadingPayload,
        timestamp: DateTime<Utc>,
    ) -> Result<StoredReading, sqlx::Error> {
        let (sensor_id, value_1, value_2, value_3) = reading.column_slots();

        sqlx::query_as::<_, StoredReading>(
            r#"
            INSERT INTO sensor_readings
                (timestamp, sensor_type, sensor_id, value_1, value_2, value_3)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, timestamp, sensor_type, sensor_id, value_1, value_2, value_3
            "#,
        )
        .bind(timestamp)
        .bind(reading.kind())
        .bind(sensor_id)
        .bind(value_1)
        .bind(value_2)
        .bind(value_3)
        .fetch_one(&self.pool)
        .await
    }

    /// The most recent `limit` readings, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<StoredReading>, sqlx::Error> {
        sqlx::query_as::<_, StoredReading>(
            r#"
            SELECT id, timestamp, sensor_type, sensor_id, value_1, value_2, value_3
            FROM sensor_readings
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
