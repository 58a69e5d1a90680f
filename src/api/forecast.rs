use axum::extract::{Path, Query, State};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::response::ApiResponse;
use crate::controller::AppState;
use crate::domain::{daily_summaries, headline, Aggregation, DailySummary, ForecastKind, ForecastSeries};

/// Per-kind overview, the values a dashboard shows.
#[derive(Debug, Serialize)]
pub struct ForecastOverview {
    kind: ForecastKind,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    produced_at: Option<DateTime<Utc>>,
    points: usize,
    current: Option<f64>,
    rest_of_today: Option<f64>,
    today_total: Option<f64>,
    unit: &'static str,
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

fn parse_kind(raw: &str) -> Result<ForecastKind, ApiError> {
    raw.parse().map_err(|_| ApiError::unknown_kind(raw))
}

fn published(state: &AppState, kind: ForecastKind) -> Result<Arc<ForecastSeries>, ApiError> {
    state.board.latest(kind).ok_or_else(|| ApiError::not_published(kind))
}

/// GET /api/v1/forecasts
pub async fn overview(State(state): State<AppState>) -> ApiResponse<Vec<ForecastOverview>> {
    let now = Utc::now().with_timezone(&state.tz);
    let items: Vec<ForecastOverview> = ForecastKind::ALL
        .iter()
        .map(|&kind| {
            let last_error = state.board.last_error(kind);
            match state.board.latest(kind) {
                Some(series) => {
                    let h = headline(kind, &series, now);
                    ForecastOverview {
                        kind,
                        available: true,
                        produced_at: Some(series.produced_at()),
                        points: series.len(),
                        current: h.current,
                        rest_of_today: h.rest_of_today,
                        today_total: h.today_total,
                        unit: h.unit,
                        stale: last_error.is_some(),
                        last_error,
                    }
                }
                None => ForecastOverview {
                    kind,
                    available: false,
                    produced_at: None,
                    points: 0,
                    current: None,
                    rest_of_today: None,
                    today_total: None,
                    unit: kind.unit(),
                    stale: last_error.is_some(),
                    last_error,
                },
            }
        })
        .collect();
    let count = items.len();
    ApiResponse::success(items).with_count(count)
}

/// GET /api/v1/forecasts/:kind
pub async fn series(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<ApiResponse<ForecastSeries>, ApiError> {
    let series = published(&state, parse_kind(&kind)?)?;
    let count = series.len();
    Ok(ApiResponse::success(ForecastSeries::clone(&series)).with_count(count))
}

/// Upper bound for `interval_hours`, one leap year.
const MAX_AGGREGATE_INTERVAL_HOURS: i64 = 24 * 366;

#[derive(Debug, Deserialize)]
pub struct AggregateQuery {
    #[serde(rename = "fn")]
    pub function: String,
    pub interval_hours: Option<i64>,
}

/// GET /api/v1/forecasts/:kind/aggregate?fn=sum|average&interval_hours=N
pub async fn aggregate(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<AggregateQuery>,
) -> Result<ApiResponse<ForecastSeries>, ApiError> {
    let kind = parse_kind(&kind)?;
    let mode: Aggregation = query.function.parse()?;
    let hours = query.interval_hours.unwrap_or(24);
    let interval = Some(hours)
        .filter(|h| (1..=MAX_AGGREGATE_INTERVAL_HOURS).contains(h))
        .and_then(Duration::try_hours)
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "interval_hours must be between 1 and {MAX_AGGREGATE_INTERVAL_HOURS}, got {hours}"
            ))
        })?;
    let series = published(&state, kind)?;
    let aggregated = series.aggregate_by_interval(mode, interval, state.tz, None)?;
    let count = aggregated.len();
    Ok(ApiResponse::success(aggregated).with_count(count))
}

/// GET /api/v1/forecasts/:kind/daily
pub async fn daily(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<ApiResponse<Vec<DailySummary>>, ApiError> {
    let series = published(&state, parse_kind(&kind)?)?;
    let days = daily_summaries(&series, state.tz);
    let count = days.len();
    Ok(ApiResponse::success(days).with_count(count))
}
