//! Wire types shared by the ingest endpoint, the relay socket, and the
//! client, plus the decode step that classifies raw device payloads at the
//! boundary.
//!
//! Every message is a tagged union over a `type` discriminator, matching
//! what the microcontroller posts and what the dashboard speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::db::models::SensorKind;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Moisture probe slot. The controller carries two probes and reports them
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Probe {
    A,
    B,
}

impl Probe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Probe::A => "A",
            Probe::B => "B",
        }
    }
}

/// One sensor reading as posted by the device, discriminated on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReadingPayload {
    Moisture { id: Probe, value: f64 },
    Dht11 { temp: f64, humidity: f64 },
    Npk { n: f64, p: f64, k: f64 },
}

impl ReadingPayload {
    pub fn kind(&self) -> SensorKind {
        match self {
            ReadingPayload::Moisture { .. } => SensorKind::Moisture,
            ReadingPayload::Dht11 { .. } => SensorKind::Dht11,
            ReadingPayload::Npk { .. } => SensorKind::Npk,
        }
    }

    /// Flatten into the `(sensor_id, value_1, value_2, value_3)` column
    /// slots of the history table.
    pub fn column_slots(&self) -> (Option<&'static str>, Option<f64>, Option<f64>, Option<f64>) {
        match *self {
            ReadingPayload::Moisture { id, value } => (Some(id.as_str()), Some(value), None, None),
            ReadingPayload::Dht11 { temp, humidity } => (None, Some(temp), Some(humidity), None),
            ReadingPayload::Npk { n, p, k } => (None, Some(n), Some(p), Some(k)),
        }
    }
}

/// A reading as broadcast to subscribers: the device fields plus the
/// server-assigned timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorUpdate {
    #[serde(flatten)]
    pub reading: ReadingPayload,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Socket messages
// ---------------------------------------------------------------------------

/// Everything the relay pushes down a subscriber socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SensorUpdate { payload: SensorUpdate },
    IrrigationState { status: bool },
    Info { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    ToggleIrrigation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPayload {
    pub status: bool,
}

/// Commands a subscriber may send upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Control {
        action: ControlAction,
        payload: ControlPayload,
    },
}

// ---------------------------------------------------------------------------
// Boundary decode
// ---------------------------------------------------------------------------

/// Outcome of classifying a raw ingest body.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Reading(ReadingPayload),
    /// Discriminator present but not a kind this server stores. Accepted
    /// and dropped upstream so newer firmware keeps posting.
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid sensor data format")]
    MissingKind,
    #[error("Invalid data provided for sensor type {kind}")]
    InvalidFields { kind: SensorKind },
}

/// Classify a raw body: no string `type` field is a hard error, an
/// unrecognized kind is [`DecodedPayload::Unknown`], and a recognized kind
/// must carry exactly the fields that kind declares.
pub fn decode_sensor_payload(body: &Value) -> Result<DecodedPayload, DecodeError> {
    let Some(raw_kind) = body.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::MissingKind);
    };
    let Ok(kind) = raw_kind.parse::<SensorKind>() else {
        return Ok(DecodedPayload::Unknown(raw_kind.to_owned()));
    };
    let reading = serde_json::from_value::<ReadingPayload>(body.clone())
        .map_err(|_| DecodeError::InvalidFields { kind })?;
    Ok(DecodedPayload::Reading(reading))
}
