//! Request metrics middleware
//!
//! Last stage of the pipeline so the observed duration covers everything.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{
    HTTP_REQUESTS_IN_PROGRESS, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS,
};

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();

    metrics::gauge!(HTTP_REQUESTS_IN_PROGRESS).increment(1.0);
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    metrics::gauge!(HTTP_REQUESTS_IN_PROGRESS).decrement(1.0);

    let status = response.status().as_u16().to_string();
    metrics::counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "status" => status)
        .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method)
        .record(duration.as_secs_f64());

    response
}
