//! Per-user concurrent-connection limiter
//!
//! Active connection ids live in a set at `ws_connections:<user>` with a one
//! hour TTL refreshed on each admission. Admission fails closed: a store
//! outage must not allow unbounded local admission.

use deadpool_redis::Pool;
use std::ops::DerefMut;

use crate::error::Result;
use crate::metrics::REDIS_OPERATIONS_TOTAL;

/// TTL guarding against stale connection entries
const CONNECTION_SET_TTL_SECS: u64 = 3600;

#[derive(Clone)]
pub struct ConnectionLimiter {
    pool: Pool,
    max_connections: u32,
}

impl ConnectionLimiter {
    pub fn new(pool: Pool, max_connections: u32) -> Self {
        Self {
            pool,
            max_connections,
        }
    }

    fn key(user: &str) -> String {
        format!("ws_connections:{}", user)
    }

    /// Admit a connection unless the user is at capacity.
    ///
    /// Fail-closed: any store error rejects.
    pub async fn try_admit(&self, user: &str, connection_id: &str) -> bool {
        match self.try_admit_inner(user, connection_id).await {
            Ok(admitted) => admitted,
            Err(e) => {
                metrics::counter!(REDIS_OPERATIONS_TOTAL, "status" => "error").increment(1);
                tracing::error!(
                    "Connection limiter failing closed for user {}: {}",
                    user,
                    e
                );
                false
            }
        }
    }

    async fn try_admit_inner(&self, user: &str, connection_id: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let key = Self::key(user);

        let count: u64 = redis::cmd("SCARD")
            .arg(&key)
            .query_async(conn.deref_mut())
            .await?;

        if count >= u64::from(self.max_connections) {
            tracing::warn!(
                "User {} exceeded max connections limit ({})",
                user,
                self.max_connections
            );
            return Ok(false);
        }

        redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&key)
            .arg(connection_id)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(CONNECTION_SET_TTL_SECS)
            .query_async::<()>(conn.deref_mut())
            .await?;

        tracing::info!(
            "Added connection {} for user {}. Total: {}/{}",
            connection_id,
            user,
            count + 1,
            self.max_connections
        );

        Ok(true)
    }

    /// Remove a connection; removing an unknown member is a no-op.
    pub async fn release(&self, user: &str, connection_id: &str) {
        let result: Result<()> = async {
            let mut conn = self.pool.get().await?;
            redis::cmd("SREM")
                .arg(Self::key(user))
                .arg(connection_id)
                .query_async::<()>(conn.deref_mut())
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!("Removed connection {} for user {}", connection_id, user);
            }
            Err(e) => {
                metrics::counter!(REDIS_OPERATIONS_TOTAL, "status" => "error").increment(1);
                tracing::error!(
                    "Failed to release connection {} for user {}: {}",
                    connection_id,
                    user,
                    e
                );
            }
        }
    }

    /// Current connection count for a user; 0 on store errors
    pub async fn count(&self, user: &str) -> u64 {
        let result: Result<u64> = async {
            let mut conn = self.pool.get().await?;
            let count = redis::cmd("SCARD")
                .arg(Self::key(user))
                .query_async(conn.deref_mut())
                .await?;
            Ok(count)
        }
        .await;

        result.unwrap_or(0)
    }
}
