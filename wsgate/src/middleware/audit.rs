//! HTTP audit middleware
//!
//! Records one audit entry per authenticated request with method, path,
//! status and duration. Runs after authentication (enforced by the pipeline
//! validator). Request bodies are not buffered here; payload capture happens
//! on the WebSocket surface where the payload is already in memory.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;

use crate::audit::{AuditEntry, Outcome};
use crate::auth::Principal;
use crate::middleware::correlation::CorrelationId;
use crate::net;
use crate::state::AppState;

/// Paths that would only generate noise
const EXCLUDED_PATHS: &[&str] = &["/health", "/metrics"];

pub async fn audit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if EXCLUDED_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }

    let Some(principal) = request.extensions().get::<Principal>().cloned() else {
        return next.run(request).await;
    };

    let method = request.method().to_string();
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|c| c.0.clone());
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let ip_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| {
            let trusted = state.config().admission.trusted_proxy_list();
            net::client_ip(request.headers(), addr.ip(), &trusted)
        });

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as i64;

    let status = response.status().as_u16();

    state
        .audit()
        .record(
            AuditEntry::new(
                principal.user_id.clone(),
                principal.username.clone(),
                principal.roles_vec(),
                method,
                path,
                Outcome::from_status(status),
            )
            .with_source(ip_address, user_agent, correlation_id)
            .with_response(i32::from(status), duration_ms),
        )
        .await;

    response
}
