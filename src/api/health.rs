use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::controller::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    forecasts_ready: bool,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// GET /api/v1/healthz
///
/// The process is up; `forecasts_ready` turns true once every kind has been
/// published.
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ready = state.board.is_complete();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: if ready { "healthy" } else { "starting" },
            version: env!("CARGO_PKG_VERSION"),
            forecasts_ready: ready,
            timestamp: chrono::Utc::now(),
        }),
    )
}
