//! Bearer authentication middleware
//!
//! Validates the token when one is present and attaches the [`Principal`] to
//! the request; unauthenticated requests continue, endpoints that require
//! auth enforce it individually.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::metrics::AUTH_FAILURES_TOTAL;
use crate::state::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer(&request) {
        match state.verifier().verify(&token).await {
            Ok(principal) => {
                tracing::Span::current()
                    .record("user_id", tracing::field::display(&principal.user_id));
                request.extensions_mut().insert(principal);
            }
            Err(failure) => {
                metrics::counter!(AUTH_FAILURES_TOTAL, "reason" => failure.reason())
                    .increment(1);
                tracing::debug!("Authentication failed: {}", failure);
            }
        }
    }

    next.run(request).await
}

/// Token from the `Authorization` header, or the `Authorization` query
/// parameter for browser WebSocket clients that cannot set headers.
fn extract_bearer(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return strip_bearer(header).map(String::from);
    }

    request.uri().query().and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "Authorization")
            .map(|(_, value)| strip_bearer(&value).unwrap_or(&value).to_string())
    })
}

fn strip_bearer(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request(uri: &str, auth_header: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(value) = auth_header {
            builder = builder.header("Authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_from_header() {
        let req = request("/web", Some("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_malformed_header_yields_none() {
        let req = request("/web", Some("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_bearer(&req), None);
    }

    #[test]
    fn test_bearer_from_query_parameter() {
        let req = request("/web?format=json&Authorization=abc.def.ghi", None);
        assert_eq!(extract_bearer(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_query_parameter_with_bearer_prefix() {
        let req = request("/web?Authorization=Bearer%20abc.def.ghi", None);
        assert_eq!(extract_bearer(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_header_wins_over_query() {
        let req = request("/web?Authorization=from-query", Some("Bearer from-header"));
        assert_eq!(extract_bearer(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_no_token_yields_none() {
        let req = request("/web", None);
        assert_eq!(extract_bearer(&req), None);
    }
}
