//! Background task supervision
//!
//! Owns the long-lived singleton tasks (audit worker, session sync, pool
//! metrics) and drives the ordered shutdown sequence.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditWorker;
use crate::metrics::{
    DB_POOL_CONNECTIONS, DB_POOL_IDLE_CONNECTIONS, REDIS_POOL_AVAILABLE, REDIS_POOL_CONNECTIONS,
};
use crate::session;
use crate::state::AppState;

const POOL_METRICS_INTERVAL: Duration = Duration::from_secs(15);

pub struct Supervisor {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start the audit worker, session-sync and pool-metrics tasks
    pub fn start(&mut self, state: &AppState, audit_worker: AuditWorker) {
        self.tasks
            .push(tokio::spawn(audit_worker.run(self.cancel.clone())));

        self.tasks.push(tokio::spawn(session::session_sync_task(
            state.clone(),
            self.cancel.clone(),
        )));

        self.tasks.push(tokio::spawn(pool_metrics_task(
            state.clone(),
            self.cancel.clone(),
        )));

        tracing::info!("Background tasks started");
    }

    /// Ordered teardown: stop new audit enqueues, cancel tasks (the audit
    /// worker drains its queue on cancellation), wait with a bound, then
    /// close the connection pools.
    pub async fn shutdown(self, state: &AppState, timeout: Duration) {
        tracing::info!("Shutting down background tasks");

        state.audit().close();
        self.cancel.cancel();

        if tokio::time::timeout(timeout, join_all(self.tasks))
            .await
            .is_err()
        {
            tracing::warn!(
                "Background tasks did not stop within {:?}; abandoning them",
                timeout
            );
        }

        state.db().close().await;
        state.redis().main.close();
        state.redis().auth.close();

        tracing::info!("Shutdown complete");
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Record database and Redis pool gauges every 15 seconds
async fn pool_metrics_task(state: AppState, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(POOL_METRICS_INTERVAL) => {}
        }

        metrics::gauge!(DB_POOL_CONNECTIONS).set(state.db().size() as f64);
        metrics::gauge!(DB_POOL_IDLE_CONNECTIONS).set(state.db().num_idle() as f64);

        let main = state.redis().main.status();
        metrics::gauge!(REDIS_POOL_CONNECTIONS, "pool" => "main").set(main.size as f64);
        metrics::gauge!(REDIS_POOL_AVAILABLE, "pool" => "main").set(main.available as f64);

        let auth = state.redis().auth.status();
        metrics::gauge!(REDIS_POOL_CONNECTIONS, "pool" => "auth").set(auth.size as f64);
        metrics::gauge!(REDIS_POOL_AVAILABLE, "pool" => "auth").set(auth.available as f64);
    }

    tracing::info!("Pool metrics task stopped");
}
