//! Metrics definitions and Prometheus exposition
//!
//! All metric names used by the gateway are declared here as consts, with
//! [`describe_metrics`] setting metadata through the `metrics` crate.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{Error, Result};

/// Total HTTP requests, labeled by method and status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
/// HTTP request duration histogram
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
/// Requests currently being processed
pub const HTTP_REQUESTS_IN_PROGRESS: &str = "http_requests_in_progress";

/// WebSocket handshake outcomes, labeled by status (accepted/rejected_auth/rejected_limit)
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Currently open WebSocket connections
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Frames received over WebSocket connections
pub const WS_MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
/// Frames sent over WebSocket connections
pub const WS_MESSAGES_SENT_TOTAL: &str = "ws_messages_sent_total";
/// Package dispatch duration histogram, labeled by pkg_id
pub const WS_MESSAGE_PROCESSING_SECONDS: &str = "ws_message_processing_duration_seconds";

/// Rate limit denials, labeled by limit_type (http/websocket)
pub const RATE_LIMIT_HITS_TOTAL: &str = "rate_limit_hits_total";
/// Redis operation outcomes, labeled by status
pub const REDIS_OPERATIONS_TOTAL: &str = "redis_operations_total";

/// Authentication failures, labeled by reason (invalid/expired/provider_unavailable)
pub const AUTH_FAILURES_TOTAL: &str = "auth_failures_total";
/// Token-claim cache hits
pub const TOKEN_CACHE_HITS_TOTAL: &str = "token_cache_hits_total";
/// Token-claim cache misses
pub const TOKEN_CACHE_MISSES_TOTAL: &str = "token_cache_misses_total";

/// Audit entries by outcome
pub const AUDIT_LOGS_TOTAL: &str = "audit_logs_total";
/// Audit entries persisted to the database
pub const AUDIT_LOGS_WRITTEN_TOTAL: &str = "audit_logs_written_total";
/// Audit entries dropped on a full queue
pub const AUDIT_LOGS_DROPPED_TOTAL: &str = "audit_logs_dropped_total";
/// Failed audit batch writes
pub const AUDIT_LOG_ERRORS_TOTAL: &str = "audit_log_errors_total";
/// Current audit queue depth
pub const AUDIT_QUEUE_SIZE: &str = "audit_queue_size";
/// Audit batch size histogram
pub const AUDIT_BATCH_SIZE: &str = "audit_batch_size";

/// Unhandled application errors, labeled by handler
pub const APP_ERRORS_TOTAL: &str = "app_errors_total";

/// Database pool size gauge
pub const DB_POOL_CONNECTIONS: &str = "db_pool_connections";
/// Idle database pool connections
pub const DB_POOL_IDLE_CONNECTIONS: &str = "db_pool_idle_connections";
/// Redis pool size gauge, labeled by pool (main/auth)
pub const REDIS_POOL_CONNECTIONS: &str = "redis_pool_connections";
/// Available Redis pool connections, labeled by pool
pub const REDIS_POOL_AVAILABLE: &str = "redis_pool_available";

/// Constant 1-gauge carrying version/runtime/environment labels
pub const BUILD_INFO: &str = "wsgate_build_info";

/// Install the Prometheus recorder and return the exposition handle
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Internal(format!("Failed to install metrics recorder: {}", e)))
}

/// Describe all metrics used by the gateway.
///
/// Sets metadata through the `describe_*` macros of the `metrics` crate.
pub fn describe_metrics() {
    metrics::describe_counter!(HTTP_REQUESTS_TOTAL, metrics::Unit::Count, "Total HTTP requests");
    metrics::describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "HTTP request duration"
    );
    metrics::describe_gauge!(
        HTTP_REQUESTS_IN_PROGRESS,
        metrics::Unit::Count,
        "HTTP requests currently being processed"
    );

    metrics::describe_counter!(
        WS_CONNECTIONS_TOTAL,
        metrics::Unit::Count,
        "WebSocket handshake outcomes"
    );
    metrics::describe_gauge!(
        WS_CONNECTIONS_ACTIVE,
        metrics::Unit::Count,
        "Currently open WebSocket connections"
    );
    metrics::describe_counter!(
        WS_MESSAGES_RECEIVED_TOTAL,
        metrics::Unit::Count,
        "Frames received over WebSocket connections"
    );
    metrics::describe_counter!(
        WS_MESSAGES_SENT_TOTAL,
        metrics::Unit::Count,
        "Frames sent over WebSocket connections"
    );
    metrics::describe_histogram!(
        WS_MESSAGE_PROCESSING_SECONDS,
        metrics::Unit::Seconds,
        "Package dispatch duration"
    );

    metrics::describe_counter!(
        RATE_LIMIT_HITS_TOTAL,
        metrics::Unit::Count,
        "Requests denied by a rate limit"
    );
    metrics::describe_counter!(
        REDIS_OPERATIONS_TOTAL,
        metrics::Unit::Count,
        "Redis operation outcomes"
    );

    metrics::describe_counter!(
        AUTH_FAILURES_TOTAL,
        metrics::Unit::Count,
        "Bearer token validation failures"
    );
    metrics::describe_counter!(
        TOKEN_CACHE_HITS_TOTAL,
        metrics::Unit::Count,
        "Token-claim cache hits"
    );
    metrics::describe_counter!(
        TOKEN_CACHE_MISSES_TOTAL,
        metrics::Unit::Count,
        "Token-claim cache misses"
    );

    metrics::describe_counter!(
        AUDIT_LOGS_TOTAL,
        metrics::Unit::Count,
        "Audit entries recorded, by outcome"
    );
    metrics::describe_counter!(
        AUDIT_LOGS_WRITTEN_TOTAL,
        metrics::Unit::Count,
        "Audit entries persisted to the database"
    );
    metrics::describe_counter!(
        AUDIT_LOGS_DROPPED_TOTAL,
        metrics::Unit::Count,
        "Audit entries dropped on a full queue"
    );
    metrics::describe_counter!(
        AUDIT_LOG_ERRORS_TOTAL,
        metrics::Unit::Count,
        "Failed audit batch writes"
    );
    metrics::describe_gauge!(AUDIT_QUEUE_SIZE, metrics::Unit::Count, "Audit queue depth");
    metrics::describe_histogram!(
        AUDIT_BATCH_SIZE,
        metrics::Unit::Count,
        "Entries per audit batch write"
    );

    metrics::describe_counter!(
        APP_ERRORS_TOTAL,
        metrics::Unit::Count,
        "Unhandled application errors"
    );

    metrics::describe_gauge!(
        DB_POOL_CONNECTIONS,
        metrics::Unit::Count,
        "Database pool connections"
    );
    metrics::describe_gauge!(
        DB_POOL_IDLE_CONNECTIONS,
        metrics::Unit::Count,
        "Idle database pool connections"
    );
    metrics::describe_gauge!(
        REDIS_POOL_CONNECTIONS,
        metrics::Unit::Count,
        "Redis pool connections"
    );
    metrics::describe_gauge!(
        REDIS_POOL_AVAILABLE,
        metrics::Unit::Count,
        "Available Redis pool connections"
    );

    metrics::describe_gauge!(BUILD_INFO, "Build metadata labels");
}

/// Register the process-wide metric labels (version, runtime, environment)
pub fn record_build_info(environment: &str) {
    metrics::gauge!(
        BUILD_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
        "runtime" => "tokio",
        "environment" => environment.to_string(),
    )
    .set(1.0);
}
