// HTTP request handlers
use crate::application::chart_registry::ChartStatus;
use crate::application::range_sync::RangeChange;
use crate::domain::chart::TimeRange;
use crate::infrastructure::chunked_json::stream_from_broadcast;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of a range change; omit both bounds to show the whole history
#[derive(Debug, Deserialize)]
pub struct RangeRequest {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReloadBody {
    chart_id: String,
    status: ChartStatus,
}

async fn respond<T: Serialize>(data: &T, status: StatusCode, headers: &HeaderMap) -> Response {
    match json_response(data, status, accepts_brotli(headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn not_found(what: String, headers: &HeaderMap) -> Response {
    respond(&ErrorBody { error: what }, StatusCode::NOT_FOUND, headers).await
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Whole page: locations, charts, lifecycle status
pub async fn get_dashboard(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.dashboard_service.snapshot().await;
    respond(&snapshot, StatusCode::OK, &headers).await
}

pub async fn get_chart(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.dashboard_service.chart(&id).await {
        Some(chart) => respond(&chart, StatusCode::OK, &headers).await,
        None => not_found(format!("chart {} not found", id), &headers).await,
    }
}

/// Refetch one chart's history
pub async fn reload_chart(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.dashboard_service.reload_chart(&id).await {
        Some(status) => respond(&ReloadBody { chart_id: id, status }, StatusCode::OK, &headers).await,
        None => not_found(format!("chart {} not found", id), &headers).await,
    }
}

/// Apply a user range selection on one chart and mirror it to its siblings
pub async fn change_range(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<RangeRequest>,
) -> Response {
    let range = match (request.min, request.max) {
        (Some(min), Some(max)) => Some(TimeRange::new(min, max)),
        (None, None) => None,
        _ => {
            let body = ErrorBody {
                error: "min and max must be given together".to_string(),
            };
            return respond(&body, StatusCode::BAD_REQUEST, &headers).await;
        }
    };

    if state.dashboard_service.chart(&id).await.is_none() {
        return not_found(format!("chart {} not found", id), &headers).await;
    }

    match state.dashboard_service.change_range(&RangeChange::user(id, range)).await {
        Ok(mutations) => respond(&mutations, StatusCode::OK, &headers).await,
        Err(e) => respond(&ErrorBody { error: e.to_string() }, StatusCode::BAD_REQUEST, &headers).await,
    }
}

/// Stream chart mutations as they happen
pub async fn stream_mutations(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("Mutation stream client connected");
    let rx = state.dashboard_service.subscribe();
    stream_from_broadcast(rx, accepts_brotli(&headers)).await
}
