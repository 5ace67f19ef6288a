//! Access-control and rate-limit middleware, composed onto the router as
//! an `axum::middleware::from_fn_with_state` layer.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::FeedbackError;
use crate::policy::{acl, EndpointClass};
use crate::AppContext;

fn classify(path: &str) -> EndpointClass {
    if path == "/api/test-bark" {
        EndpointClass::TestNotification
    } else if path.starts_with("/api/submit")
        || path.ends_with("/submit")
        || path.ends_with("/activate")
        || path == "/api/close"
        || path == "/api/update-notification-config"
    {
        EndpointClass::Submit
    } else {
        EndpointClass::Read
    }
}

pub async fn guard(
    State(ctx): State<Arc<AppContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, FeedbackError> {
    let path = req.uri().path().to_string();

    if path == "/api/health" {
        return Ok(next.run(req).await);
    }

    let snapshot = ctx.config.snapshot();
    let bind_is_loopback = snapshot
        .web_ui
        .host
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false);

    if !acl::is_allowed(&snapshot.network_security, addr.ip(), bind_is_loopback) {
        return Err(FeedbackError::PolicyRejected);
    }

    let class = classify(&path);
    let decision = ctx.rate_limiter.lock().await.check(addr.ip(), class);
    if !decision.allowed {
        return Err(FeedbackError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        });
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_submit_endpoints() {
        assert!(matches!(classify("/api/submit"), EndpointClass::Submit));
        assert!(matches!(classify("/api/tasks/proj-0001/submit"), EndpointClass::Submit));
        assert!(matches!(classify("/api/tasks/proj-0001/activate"), EndpointClass::Submit));
        assert!(matches!(classify("/api/close"), EndpointClass::Submit));
    }

    #[test]
    fn classifies_test_notification_endpoint() {
        assert!(matches!(classify("/api/test-bark"), EndpointClass::TestNotification));
    }

    #[test]
    fn classifies_reads_by_default() {
        assert!(matches!(classify("/api/tasks"), EndpointClass::Read));
        assert!(matches!(classify("/api/config"), EndpointClass::Read));
    }
}
