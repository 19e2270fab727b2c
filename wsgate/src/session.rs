//! Session keys in Redis
//!
//! Each live user owns a `session:<username>` key whose TTL follows the
//! token lifetime plus a small buffer. A background task refreshes the keys
//! for all live connections.

use deadpool_redis::Pool;
use std::ops::DerefMut;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::auth::Principal;
use crate::error::Result;
use crate::state::AppState;
use crate::ws::registry::session_key;

/// Buffer added on top of the token lifetime
const SESSION_TTL_BUFFER_SECS: i64 = 60;

#[derive(Clone)]
pub struct SessionStore {
    pool: Pool,
}

impl SessionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Write (or refresh) the session key for a principal
    pub async fn store(&self, principal: &Principal) -> Result<()> {
        let remaining = (principal.expires_at - Utc::now()).num_seconds();
        let ttl = remaining.max(0) + SESSION_TTL_BUFFER_SECS;

        let mut conn = self.pool.get().await?;
        redis::cmd("SETEX")
            .arg(session_key(&principal.username))
            .arg(ttl)
            .arg(1)
            .query_async::<()>(conn.deref_mut())
            .await?;

        Ok(())
    }

    pub async fn remove(&self, username: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("DEL")
            .arg(session_key(username))
            .query_async::<()>(conn.deref_mut())
            .await?;
        Ok(())
    }
}

/// Periodic TTL refresh for the session keys of all live connections.
///
/// The interval tracks half the shortest remaining token lifetime, capped by
/// the configured upper bound.
pub async fn session_sync_task(state: AppState, cancel: CancellationToken) {
    let max_interval = state.config().ws.session_sync_interval_duration();

    loop {
        let interval = state
            .registry()
            .min_token_remaining()
            .map(|remaining| (remaining / 2).min(max_interval))
            .unwrap_or(max_interval)
            .max(Duration::from_secs(1));

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let mut refreshed = 0usize;
        for conn in state.registry().snapshot() {
            match state.sessions().store(&conn.principal).await {
                Ok(()) => refreshed += 1,
                Err(e) => {
                    tracing::warn!(
                        "Session refresh failed for {}: {}",
                        conn.principal.username,
                        e
                    );
                }
            }
        }

        if refreshed > 0 {
            tracing::debug!(refreshed, "Session keys refreshed");
        }
    }

    tracing::info!("Session sync task stopped");
}
