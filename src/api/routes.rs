use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check, hit_count_json, post_detail, post_detail_count_hit, AppState,
};

pub fn create_router(state: Arc<AppState>) -> Router {
    #[allow(deprecated)]
    let legacy_hit_count = any(super::handlers::update_hit_count_ajax);

    Router::new()
        .route("/health", get(health_check))
        .route("/hitcount/hit/ajax/", any(hit_count_json))
        .route("/hitcount/hit/ajax/legacy/", legacy_hit_count)
        .route("/posts/{id}", get(post_detail))
        .route("/posts/{id}/count-hit", get(post_detail_count_hit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
