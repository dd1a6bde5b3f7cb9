use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use utoipa::OpenApi;

use super::{
    dto::{HealthResponse, HistoryParams, IngestResponse, SensorReadingDto},
    errors::{AppError, IngestError},
    AppState,
};
use crate::db::models::SensorKind;
use crate::protocol::{decode_sensor_payload, DecodedPayload, SensorUpdate, ServerMessage};

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Accept one sensor reading from the microcontroller.
///
/// Valid readings get a server-assigned timestamp, exactly one durable
/// write, and exactly one `sensor_update` broadcast after the write
/// acknowledges. Unknown kinds are accepted, logged, and dropped without
/// a write or broadcast.
#[utoipa::path(
    post,
    path = "/api/sensor-data",
    request_body = Object,
    responses(
        (status = 200, description = "Reading stored and broadcast, or unknown kind dropped", body = IngestResponse),
        (status = 400, description = "Missing discriminator or fields not matching the kind"),
        (status = 500, description = "Persistence failure; broadcast suppressed"),
    ),
    tag = "sensors"
)]
pub async fn ingest_sensor_data(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<IngestResponse>, IngestError> {
    match decode_sensor_payload(&body)? {
        DecodedPayload::Reading(reading) => {
            let timestamp = Utc::now();
            let stored = state.store.insert(&reading, timestamp).await?;

            state.relay.broadcast(ServerMessage::SensorUpdate {
                payload: SensorUpdate {
                    reading,
                    timestamp: stored.timestamp,
                },
            });
            info!(kind = %stored.sensor_type, id = stored.id, "Reading stored and broadcast");
            Ok(Json(IngestResponse::stored()))
        }
        DecodedPayload::Unknown(kind) => {
            warn!(kind = %kind, "Unknown sensor kind; dropped without storing");
            Ok(Json(IngestResponse::unknown_kind()))
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Fetch the most recent readings, newest first, as flat slot records.
#[utoipa::path(
    get,
    path = "/api/sensor-history",
    params(
        ("limit" = Option<i64>, Query, description = "Row count, clamped to the configured cap"),
    ),
    responses(
        (status = 200, description = "Most recent readings, newest first", body = Vec<SensorReadingDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "sensors"
)]
pub async fn sensor_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SensorReadingDto>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(state.history_limit)
        .clamp(1, state.history_limit);
    let rows = state.store.recent(limit).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_owned(),
        timestamp: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(ingest_sensor_data, sensor_history, health),
    components(schemas(IngestResponse, SensorReadingDto, HealthResponse, SensorKind)),
    tags(
        (name = "sensors", description = "Sensor ingestion and history"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Vertical Garden Relay API",
        version = "0.1.0",
        description = "Sensor ingestion, history, and the realtime relay socket"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
