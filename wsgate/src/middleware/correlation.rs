//! Correlation-ID middleware and per-request tracing span

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Correlation identifiers are capped at 8 characters
const CORRELATION_ID_LEN: usize = 8;

/// Per-request correlation identifier, available as a request extension
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn truncate(raw: &str) -> String {
    raw.chars().take(CORRELATION_ID_LEN).collect()
}

/// Take `X-Correlation-ID` from the request or generate a fresh 8-char id;
/// expose it as an extension and mirror it onto the response.
pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let cid = request
        .headers()
        .get(&CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(truncate)
        .filter(|cid| !cid.is_empty())
        .unwrap_or_else(|| truncate(&Uuid::new_v4().to_string()));

    request.extensions_mut().insert(CorrelationId(cid.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&cid) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}

/// Wrap the rest of the request in a tracing span carrying the correlation
/// id, method and path. The auth middleware records `user_id` once known.
pub async fn request_span_middleware(request: Request, next: Next) -> Response {
    let cid = request
        .extensions()
        .get::<CorrelationId>()
        .map(|c| c.0.clone())
        .unwrap_or_default();

    let span = tracing::info_span!(
        "request",
        correlation_id = %cid,
        method = %request.method(),
        path = %request.uri().path(),
        user_id = tracing::field::Empty,
    );

    next.run(request).instrument(span).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_8_chars() {
        assert_eq!(truncate("abcdefghijkl"), "abcdefgh");
        assert_eq!(truncate("ab"), "ab");
        assert_eq!(truncate(""), "");
    }
}
