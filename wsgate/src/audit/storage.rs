//! Audit storage backends

use async_trait::async_trait;
use sqlx::PgPool;

use super::entry::AuditEntry;
use crate::error::{Error, Result};

/// Persistence interface for audit batches
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Persist a batch in one transaction
    async fn insert_batch(&self, entries: &[AuditEntry]) -> Result<()>;
}

/// PostgreSQL-backed audit storage
#[derive(Clone)]
pub struct PgAuditStorage {
    pool: PgPool,
}

impl PgAuditStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `user_actions` table and its indexes.
    ///
    /// Called once during application startup.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_actions (
                id BIGSERIAL PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                user_roles TEXT[] NOT NULL,
                action_type TEXT NOT NULL,
                resource TEXT NOT NULL,
                outcome TEXT NOT NULL,
                ip_address TEXT,
                user_agent TEXT,
                request_id TEXT,
                request_data JSONB,
                response_status INTEGER,
                error_message TEXT,
                duration_ms BIGINT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Internal(format!("Failed to create user_actions table: {}", e)))?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_user_actions_timestamp ON user_actions (timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_user_actions_user_id ON user_actions (user_id)",
            "CREATE INDEX IF NOT EXISTS idx_user_actions_username ON user_actions (username)",
            "CREATE INDEX IF NOT EXISTS idx_user_actions_action_type ON user_actions (action_type)",
            "CREATE INDEX IF NOT EXISTS idx_user_actions_outcome ON user_actions (outcome)",
            "CREATE INDEX IF NOT EXISTS idx_user_actions_request_id ON user_actions (request_id)",
            "CREATE INDEX IF NOT EXISTS idx_user_actions_user_time ON user_actions (user_id, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_user_actions_user_action ON user_actions (user_id, action_type)",
        ];

        for statement in indexes {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Internal(format!("Failed to create audit index: {}", e)))?;
        }

        Ok(())
    }
}

#[async_trait]
impl AuditStorage for PgAuditStorage {
    async fn insert_batch(&self, entries: &[AuditEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO user_actions (timestamp, user_id, username, user_roles, action_type, \
             resource, outcome, ip_address, user_agent, request_id, request_data, \
             response_status, error_message, duration_ms) ",
        );

        builder.push_values(entries, |mut row, entry| {
            row.push_bind(entry.timestamp)
                .push_bind(&entry.user_id)
                .push_bind(&entry.username)
                .push_bind(&entry.user_roles)
                .push_bind(&entry.action_type)
                .push_bind(&entry.resource)
                .push_bind(entry.outcome.as_str())
                .push_bind(&entry.ip_address)
                .push_bind(&entry.user_agent)
                .push_bind(&entry.request_id)
                .push_bind(&entry.request_data)
                .push_bind(entry.response_status)
                .push_bind(&entry.error_message)
                .push_bind(entry.duration_ms);
        });

        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }
}
