use axum::{routing::get, Router};

use super::{forecast, health, status};
use crate::controller::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/status", get(status::status))
        .route("/forecasts", get(forecast::overview))
        .route("/forecasts/:kind", get(forecast::series))
        .route("/forecasts/:kind/aggregate", get(forecast::aggregate))
        .route("/forecasts/:kind/daily", get(forecast::daily))
        .with_state(state)
}
