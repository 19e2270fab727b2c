//! Bounded audit queue and batch worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::entry::AuditEntry;
use super::sanitize::sanitize_value;
use super::storage::AuditStorage;
use crate::config::AuditConfig;
use crate::metrics::{
    AUDIT_BATCH_SIZE, AUDIT_LOGS_DROPPED_TOTAL, AUDIT_LOGS_TOTAL, AUDIT_LOGS_WRITTEN_TOTAL,
    AUDIT_LOG_ERRORS_TOTAL, AUDIT_QUEUE_SIZE,
};

/// Producer half of the audit queue.
///
/// `record` sanitizes the payload and enqueues without blocking the caller
/// beyond a bounded wait; a full queue drops the entry and counts it.
#[derive(Clone)]
pub struct AuditPipeline {
    tx: mpsc::Sender<AuditEntry>,
    enabled: bool,
    queue_timeout: Duration,
    capacity: usize,
    closed: Arc<AtomicBool>,
}

impl AuditPipeline {
    /// Build the pipeline and the receiver its worker will consume
    pub fn new(config: &AuditConfig) -> (Self, mpsc::Receiver<AuditEntry>) {
        let (tx, rx) = mpsc::channel(config.queue_max_size);
        (
            Self {
                tx,
                enabled: config.log_enabled,
                queue_timeout: config.queue_timeout_duration(),
                capacity: config.queue_max_size,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Queue an entry for persistence. Returns whether it was accepted.
    pub async fn record(&self, mut entry: AuditEntry) -> bool {
        if !self.enabled || self.closed.load(Ordering::Acquire) {
            return false;
        }

        entry.request_data = entry.request_data.map(sanitize_value);

        metrics::counter!(AUDIT_LOGS_TOTAL, "outcome" => entry.outcome.as_str()).increment(1);

        let username = entry.username.clone();
        match self.tx.send_timeout(entry, self.queue_timeout).await {
            Ok(()) => {
                metrics::gauge!(AUDIT_QUEUE_SIZE)
                    .set((self.capacity - self.tx.capacity()) as f64);
                true
            }
            Err(_) => {
                metrics::counter!(AUDIT_LOGS_DROPPED_TOTAL).increment(1);
                tracing::warn!(
                    "Audit queue full ({}), dropping log entry for {}",
                    self.capacity,
                    username
                );
                false
            }
        }
    }

    /// Stop accepting new entries; called at shutdown before the drain
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Single consumer that persists queued entries in batches
pub struct AuditWorker {
    rx: mpsc::Receiver<AuditEntry>,
    storage: Arc<dyn AuditStorage>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl AuditWorker {
    pub fn new(
        rx: mpsc::Receiver<AuditEntry>,
        storage: Arc<dyn AuditStorage>,
        config: &AuditConfig,
    ) -> Self {
        Self {
            rx,
            storage,
            batch_size: config.batch_size.max(1),
            batch_timeout: config.batch_timeout_duration(),
        }
    }

    /// Run until cancellation, then drain whatever is still queued through
    /// one final batch write with no batch timeout.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Audit log background worker started");

        loop {
            let first = tokio::select! {
                entry = self.rx.recv() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
                _ = cancel.cancelled() => break,
            };

            let mut batch = Vec::with_capacity(self.batch_size);
            batch.push(first);

            let deadline = Instant::now() + self.batch_timeout;
            while batch.len() < self.batch_size {
                match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                    Ok(Some(entry)) => batch.push(entry),
                    Ok(None) => break,
                    Err(_) => break,
                }
            }

            self.write_batch(batch).await;
        }

        let mut remaining = Vec::new();
        while let Ok(entry) = self.rx.try_recv() {
            remaining.push(entry);
        }

        let drained = remaining.len();
        if !remaining.is_empty() {
            self.write_batch(remaining).await;
        }

        metrics::gauge!(AUDIT_QUEUE_SIZE).set(0.0);
        tracing::info!(drained, "Audit log worker stopped");
    }

    async fn write_batch(&self, batch: Vec<AuditEntry>) {
        let len = batch.len();
        let start = std::time::Instant::now();

        match self.storage.insert_batch(&batch).await {
            Ok(()) => {
                metrics::counter!(AUDIT_LOGS_WRITTEN_TOTAL).increment(len as u64);
                metrics::histogram!(AUDIT_BATCH_SIZE).record(len as f64);
                tracing::debug!(
                    "Wrote {} audit logs to database in {:?}",
                    len,
                    start.elapsed()
                );
            }
            Err(e) => {
                // Entries in the failed batch are lost; accepted trade-off
                metrics::counter!(AUDIT_LOG_ERRORS_TOTAL).increment(1);
                tracing::error!("Failed to write audit log batch of {}: {}", len, e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::Outcome;
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct MemoryStorage {
        batches: Mutex<Vec<Vec<AuditEntry>>>,
        fail: AtomicBool,
    }

    impl MemoryStorage {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn written(&self) -> usize {
            self.batches.lock().unwrap().iter().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl AuditStorage for MemoryStorage {
        async fn insert_batch(&self, entries: &[AuditEntry]) -> Result<()> {
            if self.fail.load(Ordering::Acquire) {
                return Err(crate::error::Error::Internal("storage down".into()));
            }
            self.batches.lock().unwrap().push(entries.to_vec());
            Ok(())
        }
    }

    fn config(queue: usize, batch: usize) -> AuditConfig {
        AuditConfig {
            log_enabled: true,
            queue_max_size: queue,
            batch_size: batch,
            batch_timeout: 0.05,
            queue_timeout: 0.05,
        }
    }

    fn entry(action: &str) -> AuditEntry {
        AuditEntry::new(
            "u-1",
            "alice",
            vec!["reader".into()],
            action,
            "WebSocket:1",
            Outcome::Success,
        )
    }

    #[tokio::test]
    async fn test_record_sanitizes_before_enqueue() {
        let (pipeline, mut rx) = AuditPipeline::new(&config(8, 4));

        let queued = pipeline
            .record(entry("POST").with_request_data(json!({"password": "hunter2", "u": "a"})))
            .await;
        assert!(queued);

        let stored = rx.recv().await.unwrap();
        let data = stored.request_data.unwrap();
        assert_eq!(data["password"], "[REDACTED]");
        assert_eq!(data["u"], "a");
    }

    #[tokio::test]
    async fn test_full_queue_drops_within_bounded_wait() {
        let (pipeline, _rx) = AuditPipeline::new(&config(2, 4));

        assert!(pipeline.record(entry("WS:1")).await);
        assert!(pipeline.record(entry("WS:1")).await);

        // Queue is full and nothing consumes; the bounded wait expires
        let start = std::time::Instant::now();
        assert!(!pipeline.record(entry("WS:1")).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_closed_pipeline_rejects() {
        let (pipeline, _rx) = AuditPipeline::new(&config(8, 4));
        pipeline.close();
        assert!(!pipeline.record(entry("WS:1")).await);
    }

    #[tokio::test]
    async fn test_worker_batches_and_drains_on_cancel() {
        let (pipeline, rx) = AuditPipeline::new(&config(64, 10));
        let storage = MemoryStorage::new();
        let worker = AuditWorker::new(rx, storage.clone(), &config(64, 10));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        for _ in 0..25 {
            assert!(pipeline.record(entry("WS:1")).await);
        }

        // Give the worker a moment, then cancel and expect a full drain
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(storage.written(), 25);
    }

    #[tokio::test]
    async fn test_worker_respects_batch_size() {
        let (pipeline, rx) = AuditPipeline::new(&config(64, 5));
        let storage = MemoryStorage::new();
        let worker = AuditWorker::new(rx, storage.clone(), &config(64, 5));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        for _ in 0..12 {
            assert!(pipeline.record(entry("WS:1")).await);
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        handle.await.unwrap();

        let batches = storage.batches.lock().unwrap();
        assert!(batches.iter().all(|b| b.len() <= 5));
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 12);
    }
}
