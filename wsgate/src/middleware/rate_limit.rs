//! HTTP rate limiting middleware
//!
//! Keys on `user:<username>` when authenticated, `ip:<client-ip>` otherwise.
//! Runs after authentication (the pipeline validator enforces the ordering).

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::Principal;
use crate::error::Error;
use crate::metrics::RATE_LIMIT_HITS_TOTAL;
use crate::net;
use crate::state::AppState;

const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Monitoring and documentation paths exempt from rate limiting
const EXCLUDED_PATHS: &[&str] = &["/health", "/metrics", "/docs", "/openapi.json"];

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let config = &state.config().rate_limit;
    if !config.enabled {
        return next.run(request).await;
    }

    let path = request.uri().path();
    if EXCLUDED_PATHS.contains(&path) || path.starts_with("/docs/") {
        return next.run(request).await;
    }

    let key = rate_limit_key(&state, &request);

    let (allowed, remaining) = state
        .rate_limiter()
        .check(&key, config.per_minute, Duration::from_secs(60), config.burst)
        .await;

    if !allowed {
        tracing::warn!(
            "Rate limit exceeded for {} on {} {}",
            key,
            request.method(),
            request.uri().path()
        );
        metrics::counter!(RATE_LIMIT_HITS_TOTAL, "limit_type" => "http").increment(1);

        let mut response = Error::RateLimitExceeded.into_response();
        let headers = response.headers_mut();
        headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(config.per_minute));
        headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(0u32));
        headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(60u32));
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(60u32));
        return response;
    }

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(config.per_minute));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(60u32));

    response
}

/// Prefer the authenticated username; fall back to the (spoofing-safe)
/// client IP.
fn rate_limit_key(state: &AppState, request: &Request) -> String {
    if let Some(principal) = request.extensions().get::<Principal>() {
        return format!("user:{}", principal.username);
    }

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match remote {
        Some(remote) => {
            let trusted = state.config().admission.trusted_proxy_list();
            format!("ip:{}", net::client_ip(request.headers(), remote, &trusted))
        }
        None => "ip:unknown".to_string(),
    }
}
