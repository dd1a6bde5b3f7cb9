use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Recognized sensor kinds, stored in the `sensor_type` column as text.
///
/// Column slot convention for `sensor_readings`:
/// - `moisture`: `sensor_id` = probe ('A'/'B'), `value_1` = moisture %
/// - `dht11`:    `value_1` = temperature °C, `value_2` = humidity %
/// - `npk`:      `value_1`/`value_2`/`value_3` = N/P/K mg/kg
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Moisture,
    Dht11,
    Npk,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensorKind::Moisture => "moisture",
            SensorKind::Dht11 => "dht11",
            SensorKind::Npk => "npk",
        };
        f.write_str(s)
    }
}

impl FromStr for SensorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "moisture" => Ok(Self::Moisture),
            "dht11" => Ok(Self::Dht11),
            "npk" => Ok(Self::Npk),
            other => Err(anyhow::anyhow!("unknown sensor kind: {other:?}")),
        }
    }
}

/// One persisted reading in the flat history-record shape.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StoredReading {
    pub id: i64,
    /// Server-assigned at ingestion time, never device-supplied.
    pub timestamp: DateTime<Utc>,
    pub sensor_type: SensorKind,
    pub sensor_id: Option<String>,
    pub value_1: Option<f64>,
    pub value_2: Option<f64>,
    pub value_3: Option<f64>,
}
