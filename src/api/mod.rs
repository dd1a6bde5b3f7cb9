pub mod dto;
pub mod errors;
pub mod handlers;
pub mod socket;

use std::sync::{atomic::AtomicBool, Arc};

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{db::ReadingStore, relay::Relay};
use handlers::ApiDoc;

/// Shared state for every handler and socket task.
#[derive(Clone)]
pub struct AppState {
    pub store: ReadingStore,
    pub relay: Relay,
    /// Last commanded irrigation state: sent to each new subscriber and
    /// re-broadcast on every toggle.
    pub irrigation: Arc<AtomicBool>,
    pub history_limit: i64,
}

impl AppState {
    pub fn new(pool: SqlitePool, relay_capacity: usize, history_limit: i64) -> Self {
        Self {
            store: ReadingStore::new(pool),
            relay: Relay::new(relay_capacity),
            irrigation: Arc::new(AtomicBool::new(false)),
            history_limit,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/api/sensor-data", post(handlers::ingest_sensor_data))
        .route("/api/sensor-history", get(handlers::sensor_history))
        .with_state(state.clone())
        .split_for_parts();

    router
        .route("/api/health", get(handlers::health))
        .route("/ws", get(socket::ws_handler).with_state(state))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
