use std::sync::Arc;

use axum::Router;

use crate::global::Global;

pub mod news;
pub mod status;

pub fn routes() -> Router<Arc<Global>> {
    Router::new().merge(news::routes()).merge(status::routes())
}
