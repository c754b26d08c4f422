use axum::{
    Json,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tracklens_api::{ApiError, ApiResponse, CsvGrid};

use crate::server::AppState;

/// Header naming the requesting user, consulted for `USER_ORGUNIT` items.
pub const USER_HEADER: &str = "x-tracklens-user";

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "TrackLens",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Csv,
}

/// Splits `{tet}`, `{tet}.json` and `{tet}.csv`.
fn split_format(target: &str) -> (&str, Format) {
    if let Some(tet) = target.strip_suffix(".csv") {
        (tet, Format::Csv)
    } else if let Some(tet) = target.strip_suffix(".json") {
        (tet, Format::Json)
    } else {
        (target, Format::Json)
    }
}

pub async fn query_tracked_entities(
    State(state): State<AppState>,
    Path(target): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (tet, format) = split_format(&target);
    let username = headers.get(USER_HEADER).and_then(|v| v.to_str().ok());
    let query = query.unwrap_or_default();

    let result = tokio::time::timeout(
        state.request_timeout,
        state.engine.query_str(tet, &query, username),
    )
    .await
    .map_err(|_| {
        tracing::warn!(tet, "analytics query timed out");
        ApiError::internal(format!(
            "query exceeded {} ms",
            state.request_timeout.as_millis()
        ))
    })?;

    let grid = result.map_err(|err| {
        tracing::warn!(
            tet,
            error = %err,
            category = %err.category(),
            "analytics query failed"
        );
        ApiError::from(err)
    })?;

    Ok(match format {
        Format::Json => ApiResponse::ok(grid).into_response(),
        Format::Csv => CsvGrid(grid).into_response(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    size: usize,
    hits: u64,
    misses: u64,
    hit_rate: f64,
}

pub async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.engine.cache_stats();
    ApiResponse::ok(CacheStatsResponse {
        size: stats.size,
        hits: stats.hits,
        misses: stats.misses,
        hit_rate: stats.hit_rate(),
    })
}

pub async fn clear_cache(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.clear_cache();
    tracing::info!("metadata cache cleared");
    StatusCode::NO_CONTENT
}
