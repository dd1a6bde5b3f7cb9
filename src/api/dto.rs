use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::{SensorKind, StoredReading};

/// Response body for `POST /api/sensor-data`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    pub message: String,
}

impl IngestResponse {
    pub fn stored() -> Self {
        Self {
            message: "Data received and stored successfully".to_owned(),
        }
    }

    /// Recognized-but-unstored unknown kind: still a 200 so firmware with
    /// newer sensors than this server keeps posting.
    pub fn unknown_kind() -> Self {
        Self {
            message: "Data received but not stored (unknown type)".to_owned(),
        }
    }
}

/// Query parameters for `GET /api/sensor-history`.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Number of most-recent rows to return; clamped to the configured cap.
    pub limit: Option<i64>,
}

/// One history record in the flat slot shape.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorReadingDto {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub sensor_type: SensorKind,
    pub sensor_id: Option<String>,
    pub value_1: Option<f64>,
    pub value_2: Option<f64>,
    pub value_3: Option<f64>,
}

impl From<StoredReading> for SensorReadingDto {
    fn from(r: StoredReading) -> Self {
        Self {
            id: r.id,
            timestamp: r.timestamp,
            sensor_type: r.sensor_type,
            sensor_id: r.sensor_id,
            value_1: r.value_1,
            value_2: r.value_2,
            value_3: r.value_3,
        }
    }
}

/// Response body for `GET /api/health`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
