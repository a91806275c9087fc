//! Worker pools for the queue pair.
//!
//! A pool runs a fixed number of polling tasks against one queue. Each
//! worker claims one job at a time, runs the handler, and records the
//! outcome (complete, retry with backoff, or permanent failure).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::models::{JobRow, QueueKind};
use super::retry_policy::RetryPolicy;
use super::store::JobQueueStore;
use crate::pipeline::PipelineError;

/// Reports milestone progress for the job currently being processed.
pub struct ProgressReporter {
    store: Arc<dyn JobQueueStore>,
    job_id: String,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn JobQueueStore>, job_id: String) -> Self {
        Self { store, job_id }
    }

    /// Best-effort progress update. A store hiccup never fails the job.
    pub fn report(&self, progress: u8) {
        if let Err(e) = self.store.update_progress(&self.job_id, progress) {
            warn!("Failed to update progress for job {}: {}", self.job_id, e);
        }
    }
}

/// Processes one claimed job of a specific queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The queue this handler serves.
    fn queue(&self) -> QueueKind;

    /// Run the job. The returned JSON becomes the job's return value.
    async fn process(
        &self,
        job: &JobRow,
        progress: &ProgressReporter,
    ) -> Result<serde_json::Value, PipelineError>;
}

/// Configuration of one worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// How long an idle worker sleeps before polling again.
    pub poll_interval: Duration,
    /// Completed jobs kept after trimming.
    pub keep_completed: usize,
    /// Failed jobs kept after trimming.
    pub keep_failed: usize,
}

/// A fixed-size worker pool bound to one queue.
pub struct WorkerPool {
    store: Arc<dyn JobQueueStore>,
    handler: Arc<dyn JobHandler>,
    retry_policy: RetryPolicy,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobQueueStore>,
        handler: Arc<dyn JobHandler>,
        retry_policy: RetryPolicy,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            store,
            handler,
            retry_policy,
            config,
        }
    }

    /// Spawn the workers. Each runs until the token is cancelled.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let queue = self.handler.queue();
        info!(
            "Starting {} workers for queue {}",
            self.config.concurrency,
            queue.as_str()
        );

        (0..self.config.concurrency)
            .map(|index| {
                let pool = self.clone();
                let token = shutdown.clone();
                tokio::spawn(async move {
                    pool.worker_loop(index, token).await;
                })
            })
            .collect()
    }

    async fn worker_loop(&self, index: usize, shutdown: CancellationToken) {
        let queue = self.handler.queue();
        debug!("Worker {}/{} started", queue.as_str(), index);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claimed = match self.store.claim_next(queue) {
                Ok(job) => job,
                Err(e) => {
                    error!("Worker {}/{} claim failed: {}", queue.as_str(), index, e);
                    None
                }
            };

            match claimed {
                Some(job) => {
                    self.process_one(job).await;
                }
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        debug!("Worker {}/{} stopped", queue.as_str(), index);
    }

    /// Run one claimed job to an outcome.
    async fn process_one(&self, job: JobRow) {
        let queue = self.handler.queue();
        let progress = ProgressReporter::new(self.store.clone(), job.id.clone());

        info!(
            "Processing {} job {} (attempt {}/{})",
            queue.as_str(),
            job.id,
            job.attempts_made,
            job.max_attempts
        );

        match self.handler.process(&job, &progress).await {
            Ok(return_value) => {
                if let Err(e) = self.store.mark_completed(&job.id, return_value) {
                    error!("Failed to mark job {} completed: {}", job.id, e);
                }
                info!("Job {} completed", job.id);
            }
            Err(err) => {
                self.record_failure(&job, err);
            }
        }

        if let Err(e) = self.store.trim_finished(
            queue,
            self.config.keep_completed,
            self.config.keep_failed,
        ) {
            warn!("Failed to trim finished jobs for {}: {}", queue.as_str(), e);
        }
    }

    fn record_failure(&self, job: &JobRow, err: PipelineError) {
        let reason = err.to_string();
        let retry = err.is_retryable()
            && self.retry_policy.has_attempts_left(job.attempts_made)
            && job.attempts_made < job.max_attempts;

        if retry {
            let next_attempt_at = self.retry_policy.next_attempt_at(job.attempts_made);
            warn!(
                "Job {} attempt {} failed, retrying in {}ms: {}",
                job.id,
                job.attempts_made,
                self.retry_policy.backoff_ms(job.attempts_made),
                reason
            );
            if let Err(e) = self.store.mark_retry(&job.id, next_attempt_at, &reason) {
                error!("Failed to mark job {} for retry: {}", job.id, e);
            }
        } else {
            error!("Job {} failed permanently: {}", job.id, reason);
            if let Err(e) = self.store.mark_failed(&job.id, &reason) {
                error!("Failed to mark job {} failed: {}", job.id, e);
            }
        }
    }
}
