//! PostgreSQL connection pool management

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::{config::DatabaseConfig, error::Result};

/// Create the database connection pool from the `DB_*` settings, retrying
/// with exponential backoff.
///
/// `pool_size`/`max_overflow` map onto the pool's min/max bounds,
/// `pool_recycle` onto the maximum connection lifetime and `pool_pre_ping`
/// onto test-before-acquire.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    create_pool_with_retries(config, config.max_retries).await
}

async fn create_pool_with_retries(config: &DatabaseConfig, max_retries: u32) -> Result<PgPool> {
    let mut attempt = 0;
    let base_delay = config.retry_delay_duration();

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Database connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "Database connection pool created: max_connections={}",
                        config.max_connections()
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay_multiplier = 2_u32.pow(attempt.saturating_sub(1));
                let delay = base_delay * delay_multiplier;

                tracing::warn!(
                    "Database connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(config.pool_size.min(config.max_connections()))
        .max_connections(config.max_connections())
        .max_lifetime(config.max_lifetime())
        .test_before_acquire(config.pool_pre_ping)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.url())
        .await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use crate::config::DatabaseConfig;

    #[test]
    fn test_pool_bounds_from_config() {
        let config = DatabaseConfig {
            pool_size: 20,
            max_overflow: 10,
            ..DatabaseConfig::default()
        };

        assert_eq!(config.max_connections(), 30);
        assert_eq!(config.max_lifetime().as_secs(), 3600);
    }

    #[test]
    fn test_retry_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay_duration().as_secs(), 2);
    }
}
