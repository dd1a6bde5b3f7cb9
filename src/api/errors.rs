use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::protocol::DecodeError;

/// Failures of a single ingest request. Validation errors are the caller's
/// fault; a rejected write is ours and also suppresses the broadcast.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Failed to store sensor data")]
    Persistence(#[from] sqlx::Error),
}

impl IngestError {
    fn status(&self) -> StatusCode {
        match self {
            IngestError::Decode(_) => StatusCode::BAD_REQUEST,
            IngestError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        if let IngestError::Persistence(e) = &self {
            error!(error = %e, "Sensor reading write rejected");
        }
        let body = Json(json!({ "message": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// Catch-all for the query endpoints: anything that bubbles up is a 500.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Request failed");
        let body = Json(json!({ "message": self.0.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
