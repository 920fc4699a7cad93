use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::global::Global;
use crate::http::error::{ApiError, ApiErrorCode};
use crate::news::store::CategoryBucket;
use crate::news::RunStats;

pub fn routes() -> Router<Arc<Global>> {
    Router::new()
        .route("/news", get(get_news))
        .route("/news/refresh", post(refresh_news))
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct NewsResponse<'a> {
    last_updated: &'a str,
    stats: &'a RunStats,
    categories: &'a CategoryBucket,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse<'a> {
    message: &'static str,
    last_updated: &'a str,
    stats: &'a RunStats,
}

/// GET /news
///
/// Serves the cached payload while fresh, aggregating on demand otherwise.
#[tracing::instrument(skip(global))]
async fn get_news(State(global): State<Arc<Global>>) -> Result<Response, ApiError> {
    let payload = global.news.get(false).await.map_err(|e| {
        tracing::error!(error = %e, "failed to produce news");
        ApiError::internal_server_error(ApiErrorCode::NEWS_UNAVAILABLE, "failed to fetch news")
    })?;

    let cache_control = format!(
        "s-maxage={}, stale-while-revalidate",
        global.news.ttl().as_secs()
    );

    Ok((
        [(header::CACHE_CONTROL, cache_control)],
        Json(NewsResponse {
            last_updated: &payload.last_updated,
            stats: &payload.stats,
            categories: &payload.categories,
        }),
    )
        .into_response())
}

/// POST /news/refresh
///
/// Re-aggregates regardless of the remaining TTL.
#[tracing::instrument(skip(global))]
async fn refresh_news(State(global): State<Arc<Global>>) -> Result<Response, ApiError> {
    let payload = global.news.get(true).await.map_err(|e| {
        tracing::error!(error = %e, "forced refresh failed");
        ApiError::internal_server_error(ApiErrorCode::REFRESH_FAILED, "failed to refresh news")
    })?;

    Ok(Json(RefreshResponse {
        message: "news refreshed",
        last_updated: &payload.last_updated,
        stats: &payload.stats,
    })
    .into_response())
}
