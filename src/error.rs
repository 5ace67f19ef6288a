//! Error taxonomy shared across the queue, rendezvous, config, and HTTP layers.
//!
//! Kinds mirror the propagation policy: `InvalidInput`/`Conflict`/`PolicyRejected`
//! are returned to the immediate caller and never treated as server faults;
//! background failures (config reload, notification dispatch, scheduler ticks)
//! never bubble up through this type — they are logged and swallowed at the
//! component boundary instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("blocked by access control")]
    PolicyRejected,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for FeedbackError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            FeedbackError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            FeedbackError::PolicyRejected => {
                (StatusCode::FORBIDDEN, "blocked by access control".to_string())
            }
            FeedbackError::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate limited".to_string())
            }
            FeedbackError::TaskNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("task not found: {id}"))
            }
            FeedbackError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            FeedbackError::Internal(msg) => {
                tracing::error!(err = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let mut response = (
            status,
            axum::Json(json!({ "status": "error", "message": message })),
        )
            .into_response();

        if let FeedbackError::RateLimited { retry_after_secs } = self {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_str(&retry_after_secs.to_string())
                    .unwrap_or_else(|_| axum::http::HeaderValue::from_static("60")),
            );
        }

        response
    }
}
