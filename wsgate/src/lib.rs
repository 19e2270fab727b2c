//! # wsgate
//!
//! Real-time request/response gateway whose external face is a single
//! authenticated WebSocket endpoint. Each client negotiates a wire format
//! (JSON or a protobuf envelope) and exchanges framed packages identified by
//! a numeric package type.
//!
//! - **Authentication**: bearer tokens validated against Keycloak, with a
//!   hashed-key claim cache in Redis
//! - **Limits**: per-user connection caps (fail-closed) and sliding-window
//!   message/request rate limits (fail-open by default)
//! - **Routing**: a write-once package router with per-handler role gates
//!   and payload schema validation
//! - **Audit**: every user action flows through a bounded queue into batched
//!   Postgres writes, with sensitive-field redaction and a shutdown drain
//! - **Broadcast**: concurrent fan-out to all live connections with bounded
//!   send timeouts
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let handle = wsgate::metrics::install_recorder()?;
//!     let (state, audit_worker) = AppState::build(config.clone(), handle).await?;
//!
//!     let app = build_router(state.clone())?;
//!     Server::new(config).serve(app, shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod health;
pub mod limits;
pub mod metrics;
pub mod middleware;
pub mod net;
pub mod observability;
pub mod openapi;
pub mod server;
pub mod session;
pub mod startup;
pub mod state;
pub mod supervisor;
pub mod ws;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditEntry, AuditPipeline, Outcome};
    pub use crate::auth::{AuthFailure, Principal};
    pub use crate::config::{Config, Environment, FailMode};
    pub use crate::error::{Error, ErrorEnvelope, Result};
    pub use crate::limits::{ConnectionLimiter, RateLimiter};
    pub use crate::observability::init_tracing;
    pub use crate::server::{build_router, shutdown_signal, Server};
    pub use crate::state::AppState;
    pub use crate::supervisor::Supervisor;
    pub use crate::ws::{
        BroadcastFrame, Connection, ConnectionId, ConnectionRegistry, HandlerContext, Meta,
        PackageHandler, PackageRouter, PkgId, RequestFrame, ResponseFrame, RspCode, WireFormat,
    };
}
