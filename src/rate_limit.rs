//! Rate limiting for the dashboard API.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

pub type ApiRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn api_rate_limiter() -> ApiRateLimiter {
    let quota = Quota::per_minute(
        NonZeroU32::new(DEFAULT_REQUESTS_PER_MINUTE).expect("quota must be non-zero"),
    );
    Arc::new(RateLimiter::direct(quota))
}

/// Middleware applied to every dashboard route. Throttled requests get the
/// same `{error}` JSON body the REST handlers use.
pub async fn enforce(limiter: ApiRateLimiter, request: Request, next: Next) -> Response {
    if limiter.check().is_err() {
        tracing::warn!(path = %request.uri().path(), "throttling dashboard request");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "too many requests" })),
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_limiter_admits_requests() {
        let limiter = api_rate_limiter();
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn limiter_eventually_rejects() {
        let limiter = api_rate_limiter();
        let mut rejected = false;
        for _ in 0..(DEFAULT_REQUESTS_PER_MINUTE * 2) {
            if limiter.check().is_err() {
                rejected = true;
                break;
            }
        }
        assert!(rejected);
    }
}
