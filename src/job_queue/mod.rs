//! Durable job queue pair for the audio pipeline.
//!
//! Two SQLite-backed queues (download, analyze) with priority ordering,
//! per-queue worker pools, bounded retries with exponential backoff, and
//! the introspection surface exposed over HTTP.

mod models;
mod retry_policy;
mod schema;
mod store;
mod worker;

pub use models::*;
pub use retry_policy::RetryPolicy;
pub use store::{JobQueueStore, SqliteJobQueueStore};
pub use worker::{JobHandler, ProgressReporter, WorkerPool, WorkerPoolConfig};
