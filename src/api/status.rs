use axum::extract::State;
use serde::Serialize;
use std::collections::BTreeMap;

use super::response::ApiResponse;
use crate::controller::{AppState, TaskStatus};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    /// Every forecast kind has been produced at least once
    bootstrapped: bool,
    tasks: BTreeMap<String, TaskStatus>,
}

/// GET /api/v1/status
pub async fn status(State(state): State<AppState>) -> ApiResponse<SystemStatus> {
    let tasks = state.board.task_statuses();
    let count = tasks.len();
    ApiResponse::success(SystemStatus {
        bootstrapped: state.board.is_complete(),
        tasks,
    })
    .with_count(count)
}
