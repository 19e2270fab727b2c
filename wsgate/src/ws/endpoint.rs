//! The `/web` WebSocket endpoint: handshake, dispatch loop, cleanup

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::StreamExt;
use serde::Deserialize;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use super::codec::WireFormat;
use super::connection::{Connection, ConnectionId};
use super::frames::RspCode;
use crate::audit::{AuditEntry, Outcome};
use crate::auth::Principal;
use crate::config::FailMode;
use crate::metrics::{
    APP_ERRORS_TOTAL, RATE_LIMIT_HITS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_MESSAGES_RECEIVED_TOTAL, WS_MESSAGES_SENT_TOTAL, WS_MESSAGE_PROCESSING_SECONDS,
};
use crate::middleware::correlation::CorrelationId;
use crate::state::AppState;
use crate::ws::router::HandlerContext;

/// Rate-limit window for WebSocket messages
const WS_MESSAGE_WINDOW: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub format: Option<String>,
}

/// Upgrade handler for `GET /web`.
///
/// The admission pipeline has already run on the upgrade request, so the
/// principal and correlation id arrive as request extensions.
pub async fn websocket_endpoint(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    principal: Option<Extension<Principal>>,
    correlation: Option<Extension<CorrelationId>>,
) -> Response {
    let format = WireFormat::negotiate(query.format.as_deref());
    let principal = principal.map(|Extension(p)| p);
    let correlation = correlation.map(|Extension(c)| c.0);

    ws.on_upgrade(move |socket| {
        handle_socket(state, socket, principal, format, correlation, addr)
    })
}

async fn handle_socket(
    state: AppState,
    mut socket: WebSocket,
    principal: Option<Principal>,
    format: WireFormat,
    correlation: Option<String>,
    addr: SocketAddr,
) {
    let Some(principal) = principal else {
        tracing::debug!("Client is not logged in, websocket connection will be closed");
        metrics::counter!(WS_CONNECTIONS_TOTAL, "status" => "rejected_auth").increment(1);
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 1008,
                reason: "Authentication required".into(),
            })))
            .await;
        return;
    };

    let connection_id = ConnectionId::new();
    let correlation_id = correlation.unwrap_or_else(|| connection_id.short());
    let username = principal.username.clone();

    // Admission is fail-closed: a store outage rejects the handshake
    if !state
        .connection_limiter()
        .try_admit(&username, &connection_id.to_string())
        .await
    {
        tracing::warn!("Connection limit exceeded for user {}", username);
        metrics::counter!(WS_CONNECTIONS_TOTAL, "status" => "rejected_limit").increment(1);
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 1008,
                reason: "Maximum concurrent connections exceeded".into(),
            })))
            .await;
        return;
    }

    if let Err(e) = state.sessions().store(&principal).await {
        tracing::warn!("Session key write failed for {}: {}", username, e);
    }

    let (sink, mut stream) = socket.split();
    let conn = Arc::new(Connection::new(
        connection_id,
        principal,
        format,
        correlation_id.clone(),
        sink,
    ));

    state.registry().add(conn.clone());
    metrics::counter!(WS_CONNECTIONS_TOTAL, "status" => "accepted").increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    tracing::debug!(
        connection_id = %connection_id,
        correlation_id = %correlation_id,
        format = format.as_str(),
        "Client connected to websocket"
    );

    let mut close_code: u16 = 1000;

    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, "Receive error: {}", e);
                close_code = 1011;
                break;
            }
        };

        match message {
            Message::Text(_) | Message::Binary(_) => {
                match process_frame(&state, &conn, &message, &addr).await {
                    ControlFlow::Continue(()) => {}
                    ControlFlow::Break(code) => {
                        close_code = code;
                        break;
                    }
                }
            }
            Message::Close(frame) => {
                close_code = frame.map(|f| f.code).unwrap_or(1000);
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    state.registry().remove(&conn);
    state
        .connection_limiter()
        .release(&conn.principal.username, &connection_id.to_string())
        .await;
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);

    tracing::debug!(
        connection_id = %connection_id,
        close_code,
        "Client of user {} disconnected",
        conn.principal.username
    );
}

/// Handle one inbound frame. `Break(code)` ends the dispatch loop; the
/// close frame has already been sent.
async fn process_frame(
    state: &AppState,
    conn: &Arc<Connection>,
    message: &Message,
    addr: &SocketAddr,
) -> ControlFlow<u16> {
    metrics::counter!(WS_MESSAGES_RECEIVED_TOTAL).increment(1);

    let principal = &conn.principal;

    // Message rate limit is always fail-open: a store outage lets frames
    // through rather than severing live conversations.
    let rate_key = format!("ws_msg:user:{}", principal.username);
    let (allowed, _) = state
        .rate_limiter()
        .check_with_mode(
            &rate_key,
            state.config().ws.message_rate_limit,
            WS_MESSAGE_WINDOW,
            None,
            FailMode::Open,
        )
        .await;

    if !allowed {
        tracing::warn!(
            "WebSocket message rate limit exceeded for user {}",
            principal.username
        );
        metrics::counter!(RATE_LIMIT_HITS_TOTAL, "limit_type" => "websocket").increment(1);
        conn.close(1008, "Message rate limit exceeded").await;
        return ControlFlow::Break(1008);
    }

    let request = match conn.format.codec().decode_request(message) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(
                "Invalid frame from user {}: {}",
                principal.username,
                e
            );
            state
                .audit()
                .record(
                    AuditEntry::new(
                        principal.user_id.clone(),
                        principal.username.clone(),
                        principal.roles_vec(),
                        "WS:INVALID_REQUEST",
                        "WebSocket",
                        Outcome::Error,
                    )
                    .with_source(
                        Some(addr.ip().to_string()),
                        None,
                        Some(conn.correlation_id.clone()),
                    )
                    .with_error(e.to_string()),
                )
                .await;
            conn.close(1003, "Unsupported data").await;
            return ControlFlow::Break(1003);
        }
    };

    let pkg_id = request.pkg_id;
    let request_data = serde_json::Value::Object(request.data.clone());
    let ctx = HandlerContext {
        principal: principal.clone(),
        registry: state.registry().clone(),
    };

    let start = Instant::now();
    let result = state.router().dispatch(&ctx, request).await;
    let duration = start.elapsed();

    metrics::histogram!(WS_MESSAGE_PROCESSING_SECONDS, "pkg_id" => pkg_id.to_string())
        .record(duration.as_secs_f64());

    match result {
        Ok(response) => {
            match conn.format.codec().encode_response(&response) {
                Ok(message) => {
                    if let Err(e) = conn.send(message).await {
                        // Connection went away mid-send; cleanup happens on
                        // the dispatch loop's next poll
                        tracing::warn!(
                            "Failed to send response to {}: {}",
                            principal.username,
                            e
                        );
                        return ControlFlow::Continue(());
                    }
                    metrics::counter!(WS_MESSAGES_SENT_TOTAL).increment(1);
                }
                Err(e) => {
                    tracing::error!("Response encoding failed: {}", e);
                    conn.close(1011, "Internal server error").await;
                    return ControlFlow::Break(1011);
                }
            }

            let outcome = if response.status_code == RspCode::Ok {
                Outcome::Success
            } else if response.status_code == RspCode::PermissionDenied {
                Outcome::PermissionDenied
            } else {
                Outcome::Error
            };

            state
                .audit()
                .record(
                    AuditEntry::new(
                        principal.user_id.clone(),
                        principal.username.clone(),
                        principal.roles_vec(),
                        format!("WS:{}", pkg_id),
                        format!("WebSocket:{}", pkg_id),
                        outcome,
                    )
                    .with_source(
                        Some(addr.ip().to_string()),
                        None,
                        Some(conn.correlation_id.clone()),
                    )
                    .with_request_data(request_data)
                    .with_response(response.status_code.into(), duration.as_millis() as i64),
                )
                .await;

            ControlFlow::Continue(())
        }
        Err(e) => {
            tracing::error!(
                "Unhandled error processing pkg_id {} from {}: {}",
                pkg_id,
                principal.username,
                e
            );
            metrics::counter!(APP_ERRORS_TOTAL, "handler" => "websocket").increment(1);

            state
                .audit()
                .record(
                    AuditEntry::new(
                        principal.user_id.clone(),
                        principal.username.clone(),
                        principal.roles_vec(),
                        "WS:ERROR",
                        "WebSocket",
                        Outcome::Error,
                    )
                    .with_source(
                        Some(addr.ip().to_string()),
                        None,
                        Some(conn.correlation_id.clone()),
                    )
                    .with_request_data(request_data)
                    .with_error(e.to_string()),
                )
                .await;

            conn.close(1011, "Internal server error").await;
            ControlFlow::Break(1011)
        }
    }
}
