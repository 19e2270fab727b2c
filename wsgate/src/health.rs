//! Health, metrics exposition and system-info handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Principal;
use crate::cache;
use crate::error::Error;
use crate::state::AppState;

/// Liveness payload: overall status plus both backing stores
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    /// "ok" or "error"
    pub database: String,
    /// "ok" or "error"
    pub redis: String,
}

/// Liveness probe.
///
/// 200 when both stores respond, 503 otherwise.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Both stores reachable", body = HealthResponse),
        (status = 503, description = "A backing store is down", body = HealthResponse),
    )
)]
pub async fn health(State(state): State<AppState>) -> Response {
    let database_ok = match sqlx::query("SELECT 1").fetch_one(state.db()).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            false
        }
    };

    let redis_ok = match cache::ping(&state.redis().main).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Redis health check failed: {}", e);
            false
        }
    };

    let healthy = database_ok && redis_ok;

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        database: if database_ok { "ok" } else { "error" }.to_string(),
        redis: if redis_ok { "ok" } else { "error" }.to_string(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body)).into_response()
}

/// Metrics exposition in the Prometheus text format
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    let body = state.metrics_handle().render();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Runtime and pool configuration, admin only
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SystemInfoResponse {
    pub version: String,
    pub environment: String,
    pub cpu_count: usize,
    pub db_pool_size: u32,
    pub db_max_overflow: u32,
    pub redis_max_connections: usize,
    pub ws_max_connections_per_user: u32,
    pub ws_message_rate_limit: u32,
    pub active_connections: usize,
}

/// CPU/memory/worker configuration. Requires the `admin` role.
#[utoipa::path(
    get,
    path = "/system-info",
    responses(
        (status = 200, description = "System configuration", body = SystemInfoResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Missing admin role"),
    )
)]
pub async fn system_info(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
) -> Result<Json<SystemInfoResponse>, Error> {
    let Some(Extension(principal)) = principal else {
        return Err(Error::Unauthorized("Authentication required".into()));
    };

    if !principal.has_role("admin") {
        return Err(Error::Forbidden("Missing required role: admin".into()));
    }

    let config = state.config();

    Ok(Json(SystemInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: config.service.environment.to_string(),
        cpu_count: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        db_pool_size: config.database.pool_size,
        db_max_overflow: config.database.max_overflow,
        redis_max_connections: config.redis.max_connections,
        ws_max_connections_per_user: config.ws.max_connections_per_user,
        ws_message_rate_limit: config.ws.message_rate_limit,
        active_connections: state.registry().count(),
    }))
}
