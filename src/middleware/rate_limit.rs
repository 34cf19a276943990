use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::middleware::auth::Claims;

const WINDOW: Duration = Duration::from_secs(1);
const ANONYMOUS_KEY: &str = "anonymous";

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Fixed-window limiter keyed per authenticated caller, so one chatty client
/// exhausts its own budget without starving everyone else's sends. Requests
/// without a decoded identity share a single bucket. Runs inside the auth
/// layer and reads the `Claims` extension it inserts.
#[derive(Clone)]
pub struct RateLimiter {
    rps: u32,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        // Keep the map bounded to callers active within the current window.
        windows.retain(|_, window| now.duration_since(window.start) < WINDOW);

        let window = windows.entry(key.to_string()).or_insert(Window {
            start: now,
            count: 0,
        });
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = req
        .extensions()
        .get::<Claims>()
        .map(|claims| claims.sub.clone())
        .unwrap_or_else(|| ANONYMOUS_KEY.to_string());

    if !limiter.allow(&key) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error":"rate_limit_exceeded"})),
        )
            .into_response();
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32) -> RateLimiter {
    RateLimiter::new(rps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_per_caller() {
        let limiter = RateLimiter::new(2);

        assert!(limiter.allow("user-a"));
        assert!(limiter.allow("user-a"));
        assert!(!limiter.allow("user-a"));

        // A different caller is untouched by A's exhaustion.
        assert!(limiter.allow("user-b"));
    }

    #[test]
    fn window_resets_after_the_interval() {
        let limiter = RateLimiter::new(1);

        assert!(limiter.allow("user-a"));
        assert!(!limiter.allow("user-a"));

        std::thread::sleep(WINDOW + Duration::from_millis(50));
        assert!(limiter.allow("user-a"));
    }

    #[test]
    fn idle_buckets_are_pruned() {
        let limiter = RateLimiter::new(5);
        assert!(limiter.allow("user-a"));
        assert!(limiter.allow("user-b"));
        assert_eq!(limiter.windows.lock().unwrap().len(), 2);

        std::thread::sleep(WINDOW + Duration::from_millis(50));
        assert!(limiter.allow("user-c"));
        assert_eq!(limiter.windows.lock().unwrap().len(), 1);
    }
}
