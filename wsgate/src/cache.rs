//! Redis connection pool management
//!
//! Two pools share one server: the main logical database holds rate-limit
//! buckets and connection-count sets, the auth database holds session keys
//! and cached token claims.

use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
use std::ops::DerefMut;

use crate::{config::RedisConfig, error::Result};

/// The pair of Redis pools used by the gateway
#[derive(Clone)]
pub struct RedisPools {
    /// Rate limiting, connection counting
    pub main: Pool,
    /// Sessions, token claims
    pub auth: Pool,
}

/// Create both Redis pools from the `REDIS_*` settings
pub async fn create_pools(config: &RedisConfig) -> Result<RedisPools> {
    let main = create_pool(config, config.main_db).await?;
    let auth = create_pool(config, config.auth_db).await?;
    Ok(RedisPools { main, auth })
}

/// Create one pool with retry and exponential backoff
async fn create_pool(config: &RedisConfig, db: u8) -> Result<Pool> {
    let mut attempt = 0;
    let base_delay = config.retry_delay_duration();

    loop {
        match try_create_pool(config, db).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Redis connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        db,
                        max_connections = config.max_connections,
                        "Redis connection pool created"
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    tracing::error!(
                        "Failed to connect to Redis after {} attempts: {}",
                        config.max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay_multiplier = 2_u32.pow(attempt.saturating_sub(1));
                let delay = base_delay * delay_multiplier;

                tracing::warn!(
                    "Redis connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Attempt to create a Redis pool (single try); the connection is validated
/// with a ping before the pool is handed out.
async fn try_create_pool(config: &RedisConfig, db: u8) -> Result<Pool> {
    let cfg = DeadpoolConfig::from_url(config.url(db));

    let pool = cfg
        .builder()
        .map_err(|e| crate::error::Error::Internal(format!("Failed to build Redis pool: {}", e)))?
        .max_size(config.max_connections)
        .create_timeout(Some(config.connect_timeout_duration()))
        .wait_timeout(Some(config.socket_timeout_duration()))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| crate::error::Error::Internal(format!("Failed to create Redis pool: {}", e)))?;

    ping(&pool).await?;

    Ok(pool)
}

/// Ping a pool; used by pool creation, the health endpoint and startup
/// validation
pub async fn ping(pool: &Pool) -> Result<()> {
    let mut conn = pool.get().await?;
    redis::cmd("PING")
        .query_async::<String>(conn.deref_mut())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::RedisConfig;

    #[test]
    fn test_pool_urls_use_distinct_databases() {
        let config = RedisConfig::default();
        assert_ne!(config.url(config.main_db), config.url(config.auth_db));
    }

    #[test]
    fn test_retry_defaults() {
        let config = RedisConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay_duration().as_secs(), 2);
    }
}
