//! Content-security response headers middleware.
//!
//! The contract only fixes the outcome ("the HTML response must instruct
//! browsers to refuse third-party script sources and framing"), not the
//! exact header syntax — these values are one reasonable fixed point.

use axum::http::header::{HeaderValue, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::middleware::Next;
use axum::response::Response;
use axum::extract::Request;

const CSP: &str = "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'";

pub async fn apply(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP));
    response
}
