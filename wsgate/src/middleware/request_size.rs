//! Request body size limit middleware
//!
//! Rejects requests whose declared `Content-Length` exceeds the configured
//! maximum. A length exactly at the maximum is accepted.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::Error;
use crate::state::AppState;

pub async fn request_size_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let max_size = state.config().admission.max_request_body_size;

    let content_length = request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    if let Some(length) = content_length {
        if length > max_size {
            tracing::warn!(
                "Rejecting request to {}: body of {} bytes exceeds limit of {}",
                request.uri().path(),
                length,
                max_size
            );
            return Error::PayloadTooLarge(length).into_response();
        }
    }

    next.run(request).await
}
