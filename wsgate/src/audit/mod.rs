//! Asynchronous audit trail
//!
//! User actions are recorded as structured entries, pushed through a bounded
//! in-memory queue and persisted in batches by a single background worker.
//! An entry, once enqueued, is either written or counted as dropped/errored;
//! it is never silently lost.

pub mod entry;
pub mod pipeline;
pub mod sanitize;
pub mod storage;

pub use entry::{AuditEntry, Outcome};
pub use pipeline::{AuditPipeline, AuditWorker};
pub use storage::{AuditStorage, PgAuditStorage};
