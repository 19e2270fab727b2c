//! Sliding-window rate limiter
//!
//! Each key owns a sorted set at `rate_limit:<key>` whose members and scores
//! are request timestamps in seconds. A check purges entries older than the
//! window, counts the remainder and admits or rejects; admitted requests add
//! their own timestamp. The set expires after twice the window, so idle keys
//! clean themselves up.

use deadpool_redis::Pool;
use std::ops::DerefMut;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{FailMode, RateLimitConfig};
use crate::error::Result;
use crate::metrics::REDIS_OPERATIONS_TOTAL;

#[derive(Clone)]
pub struct RateLimiter {
    pool: Pool,
    enabled: bool,
    fail_mode: FailMode,
}

impl RateLimiter {
    pub fn new(pool: Pool, config: &RateLimitConfig) -> Self {
        Self {
            pool,
            enabled: config.enabled,
            fail_mode: config.fail_mode,
        }
    }

    /// Check a key against `limit` requests per `window`, using the
    /// configured fail mode on store errors.
    ///
    /// Returns `(allowed, remaining)`.
    pub async fn check(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        burst: Option<u32>,
    ) -> (bool, u32) {
        self.check_with_mode(key, limit, window, burst, self.fail_mode)
            .await
    }

    /// Like [`check`](Self::check) but with an explicit fail mode; the
    /// WebSocket message gate always fails open regardless of configuration.
    pub async fn check_with_mode(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        burst: Option<u32>,
        fail_mode: FailMode,
    ) -> (bool, u32) {
        if !self.enabled {
            return (true, limit);
        }

        match self.try_check(key, limit, window, burst).await {
            Ok(result) => result,
            Err(e) => {
                metrics::counter!(REDIS_OPERATIONS_TOTAL, "status" => "error").increment(1);
                tracing::error!("Redis error for rate limit key {}: {}", key, e);
                match fail_mode {
                    FailMode::Open => (true, limit),
                    FailMode::Closed => {
                        tracing::warn!(
                            "Rate limiter failing closed due to Redis error for key {}",
                            key
                        );
                        (false, 0)
                    }
                }
            }
        }
    }

    async fn try_check(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        burst: Option<u32>,
    ) -> Result<(bool, u32)> {
        let mut conn = self.pool.get().await?;

        let redis_key = format!("rate_limit:{}", key);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let window_start = now - window.as_secs_f64();

        // Purge everything older than the window and count what remains
        let (_removed, count): (u64, u64) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg(0f64)
            .arg(window_start)
            .cmd("ZCARD")
            .arg(&redis_key)
            .query_async(conn.deref_mut())
            .await?;

        let effective_limit = effective_limit(limit, burst);

        if count >= u64::from(effective_limit) {
            return Ok((false, 0));
        }

        // Record this request and refresh the bucket TTL
        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&redis_key)
            .arg(now)
            .arg(now.to_string())
            .cmd("EXPIRE")
            .arg(&redis_key)
            .arg(window.as_secs() * 2)
            .query_async::<()>(conn.deref_mut())
            .await?;

        metrics::counter!(REDIS_OPERATIONS_TOTAL, "status" => "success").increment(1);

        Ok((true, effective_limit - count as u32 - 1))
    }

    /// Drop the bucket for a key
    pub async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("DEL")
            .arg(format!("rate_limit:{}", key))
            .query_async::<()>(conn.deref_mut())
            .await?;
        Ok(())
    }
}

fn effective_limit(limit: u32, burst: Option<u32>) -> u32 {
    match burst {
        Some(burst) => burst.min(limit),
        None => limit,
    }
}
