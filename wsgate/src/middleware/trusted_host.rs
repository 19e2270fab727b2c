//! Trusted-host middleware
//!
//! Validates the `Host` header against the configured allowlist. `*` allows
//! any host; `*.example.com` allows any subdomain.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

pub async fn trusted_host_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let allowed = state.config().admission.allowed_host_list();

    let host = request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_port)
        .unwrap_or("");

    if host_allowed(host, &allowed) {
        next.run(request).await
    } else {
        tracing::warn!("Rejected request with untrusted Host header: {:?}", host);
        (StatusCode::BAD_REQUEST, "Invalid host header").into_response()
    }
}

fn strip_port(host: &str) -> &str {
    // IPv6 literals keep their brackets; everything else drops the port
    if host.starts_with('[') {
        host.split(']').next().map(|h| &host[..h.len() + 1]).unwrap_or(host)
    } else {
        host.split(':').next().unwrap_or(host)
    }
}

fn host_allowed(host: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|pattern| {
        if pattern == "*" {
            true
        } else if let Some(suffix) = pattern.strip_prefix("*.") {
            host.strip_suffix(suffix)
                .map(|prefix| prefix.ends_with('.'))
                .unwrap_or(false)
        } else {
            host == pattern
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wildcard_allows_anything() {
        assert!(host_allowed("anything.example.com", &allowed(&["*"])));
        assert!(host_allowed("", &allowed(&["*"])));
    }

    #[test]
    fn test_exact_match() {
        let hosts = allowed(&["api.example.com"]);
        assert!(host_allowed("api.example.com", &hosts));
        assert!(!host_allowed("evil.example.com", &hosts));
        assert!(!host_allowed("", &hosts));
    }

    #[test]
    fn test_subdomain_wildcard() {
        let hosts = allowed(&["*.example.com"]);
        assert!(host_allowed("api.example.com", &hosts));
        assert!(host_allowed("a.b.example.com", &hosts));
        assert!(!host_allowed("example.com", &hosts));
        assert!(!host_allowed("badexample.com", &hosts));
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }
}
