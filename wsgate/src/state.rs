//! Application state shared across handlers and middleware

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;

use crate::audit::{AuditPipeline, AuditWorker, PgAuditStorage};
use crate::auth::{KeycloakVerifier, TokenClaimCache};
use crate::cache::{self, RedisPools};
use crate::config::Config;
use crate::database;
use crate::error::Result;
use crate::limits::{ConnectionLimiter, RateLimiter};
use crate::session::SessionStore;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::router::PackageRouter;

struct StateInner {
    config: Config,
    db: PgPool,
    redis: RedisPools,
    verifier: KeycloakVerifier,
    rate_limiter: RateLimiter,
    connection_limiter: ConnectionLimiter,
    registry: Arc<ConnectionRegistry>,
    router: Arc<PackageRouter>,
    audit: AuditPipeline,
    audit_storage: PgAuditStorage,
    sessions: SessionStore,
    metrics: PrometheusHandle,
}

/// Shared application state; cheap to clone.
///
/// Components are constructed here and handed in explicitly wherever they
/// are needed (no module-level globals).
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

impl AppState {
    /// Build pools and components from configuration.
    ///
    /// Returns the state plus the audit worker, which the supervisor spawns.
    pub async fn build(config: Config, metrics: PrometheusHandle) -> Result<(Self, AuditWorker)> {
        let db = database::create_pool(&config.database).await?;
        let redis = cache::create_pools(&config.redis).await?;

        let token_cache = TokenClaimCache::new(redis.auth.clone());
        let verifier = KeycloakVerifier::new(config.keycloak.clone(), token_cache);

        let rate_limiter = RateLimiter::new(redis.main.clone(), &config.rate_limit);
        let connection_limiter =
            ConnectionLimiter::new(redis.main.clone(), config.ws.max_connections_per_user);

        let registry = Arc::new(ConnectionRegistry::new(
            config.ws.broadcast_send_timeout_duration(),
        ));

        let mut router = PackageRouter::new();
        crate::handlers::register_all(&mut router)?;
        let router = Arc::new(router);

        let (audit, audit_rx) = AuditPipeline::new(&config.audit);
        let audit_storage = PgAuditStorage::new(db.clone());
        let audit_worker = AuditWorker::new(
            audit_rx,
            Arc::new(audit_storage.clone()),
            &config.audit,
        );

        let sessions = SessionStore::new(redis.auth.clone());

        let state = Self {
            inner: Arc::new(StateInner {
                config,
                db,
                redis,
                verifier,
                rate_limiter,
                connection_limiter,
                registry,
                router,
                audit,
                audit_storage,
                sessions,
                metrics,
            }),
        };

        Ok((state, audit_worker))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn redis(&self) -> &RedisPools {
        &self.inner.redis
    }

    pub fn verifier(&self) -> &KeycloakVerifier {
        &self.inner.verifier
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    pub fn connection_limiter(&self) -> &ConnectionLimiter {
        &self.inner.connection_limiter
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    pub fn router(&self) -> &Arc<PackageRouter> {
        &self.inner.router
    }

    pub fn audit(&self) -> &AuditPipeline {
        &self.inner.audit
    }

    pub fn audit_storage(&self) -> &PgAuditStorage {
        &self.inner.audit_storage
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub fn metrics_handle(&self) -> &PrometheusHandle {
        &self.inner.metrics
    }
}
