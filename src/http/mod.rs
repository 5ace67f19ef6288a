//! The HTTP surface: axum router, access control, rate limiting, and
//! content-security headers.
//!
//! A `Router<Arc<AppContext>>` assembled from `.route(...)` calls with
//! `with_state` at the end, layered with `tower_http`'s trace layer and two
//! `axum::middleware::from_fn[_with_state]` layers for ACL/rate-limiting and
//! content-security headers.

mod guard;
mod headers;
mod images;
mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AppContext;

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/config", get(routes::get_config))
        .route("/api/tasks", get(routes::list_tasks))
        .route("/api/tasks/{id}", get(routes::get_task))
        .route("/api/tasks/{id}/activate", post(routes::activate_task))
        .route("/api/submit", post(routes::submit_active))
        .route("/api/tasks/{id}/submit", post(routes::submit_task))
        .route("/api/close", post(routes::close_active))
        .route(
            "/api/get-notification-config",
            get(routes::get_notification_config),
        )
        .route(
            "/api/update-notification-config",
            post(routes::update_notification_config),
        )
        .route("/api/test-bark", post(routes::test_bark))
        .route("/api/get-feedback-prompts", get(routes::get_feedback_prompts))
        .route("/api/health", get(routes::health))
        .layer(axum::middleware::from_fn(headers::apply))
        .layer(axum::middleware::from_fn_with_state(ctx.clone(), guard::guard))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
