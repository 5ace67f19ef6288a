//! Per-client, per-endpoint-class rate limiting.
//!
//! A `HashMap`-keyed tumbling-window tracker, no external rate-limiting
//! crate. Three endpoint classes, each with its own limit and window.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// `GET /api/config`, `/api/tasks`, `/api/tasks/{id}`, `/api/get-*`.
    Read,
    /// `POST /api/submit`, `/api/tasks/{id}/submit`, `/api/tasks/{id}/activate`, `/api/close`.
    Submit,
    /// `POST /api/test-bark`.
    TestNotification,
}

impl EndpointClass {
    fn limit_and_window(self) -> (u32, Duration) {
        match self {
            EndpointClass::Read => (120, Duration::from_secs(60)),
            EndpointClass::Submit => (20, Duration::from_secs(60)),
            EndpointClass::TestNotification => (5, Duration::from_secs(60)),
        }
    }
}

struct Window {
    count: u32,
    window_start: Instant,
}

/// A client is rejected once it exceeds its class's limit within the
/// current tumbling window; the window resets wholesale rather than
/// leaking continuously.
pub struct RateLimiter {
    windows: HashMap<(IpAddr, EndpointClass), Window>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }

    pub fn check(&mut self, ip: IpAddr, class: EndpointClass) -> RateLimitDecision {
        let (limit, window_len) = class.limit_and_window();
        let now = Instant::now();

        let window = self
            .windows
            .entry((ip, class))
            .or_insert_with(|| Window {
                count: 0,
                window_start: now,
            });

        if now.duration_since(window.window_start) >= window_len {
            window.count = 0;
            window.window_start = now;
        }

        window.count += 1;

        if window.count > limit {
            let elapsed = now.duration_since(window.window_start);
            let retry_after = window_len.saturating_sub(elapsed).as_secs().max(1);
            RateLimitDecision {
                allowed: false,
                retry_after_secs: retry_after,
            }
        } else {
            RateLimitDecision {
                allowed: true,
                retry_after_secs: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, n))
    }

    #[test]
    fn allows_under_limit() {
        let mut limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check(ip(1), EndpointClass::TestNotification).allowed);
        }
    }

    #[test]
    fn rejects_over_limit_with_retry_after() {
        let mut limiter = RateLimiter::new();
        for _ in 0..5 {
            limiter.check(ip(1), EndpointClass::TestNotification);
        }
        let decision = limiter.check(ip(1), EndpointClass::TestNotification);
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs > 0);
    }

    #[test]
    fn classes_and_clients_are_independent() {
        let mut limiter = RateLimiter::new();
        for _ in 0..5 {
            limiter.check(ip(1), EndpointClass::TestNotification);
        }
        assert!(limiter.check(ip(2), EndpointClass::TestNotification).allowed);
        assert!(limiter.check(ip(1), EndpointClass::Read).allowed);
    }
}
