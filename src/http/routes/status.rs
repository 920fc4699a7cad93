use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::global::Global;
use crate::news::CacheInfo;

pub fn routes() -> Router<Arc<Global>> {
    Router::new().route("/status", get(status))
}

#[derive(serde::Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime: u64,
    cache: CacheInfo,
}

/// GET /status
///
/// Reports cache state; never triggers a fetch.
#[tracing::instrument(skip(global))]
async fn status(State(global): State<Arc<Global>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        uptime: global.started_at.elapsed().as_secs(),
        cache: global.news.info().await,
    })
}
