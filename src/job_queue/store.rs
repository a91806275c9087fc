//! Queue storage and persistence.
//!
//! SQLite-backed storage for both pipeline queues. The claim transition is
//! a single guarded state flip, which is what gives each job exactly one
//! active worker at a time.

use super::models::*;
use super::schema::{JOB_QUEUE_SCHEMA_SQL, JOB_QUEUE_SCHEMA_VERSION};
use crate::sqlite_persistence::{now_millis, open_with_schema};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Trait for queue storage operations.
pub trait JobQueueStore: Send + Sync {
    /// Add a new job to a queue. Returns the generated job id.
    fn enqueue(
        &self,
        queue: QueueKind,
        data: serde_json::Value,
        priority: i32,
        max_attempts: i32,
    ) -> Result<String>;

    /// Get a job by id, from either queue.
    fn get_job(&self, id: &str) -> Result<Option<JobRow>>;

    /// Atomically claim the next ready job of a queue (QUEUED → ACTIVE).
    ///
    /// Ready means queued and past its backoff gate. Jobs are served lowest
    /// priority value first, oldest first within a priority. The claim
    /// increments `attempts_made` and stamps `processed_on`.
    fn claim_next(&self, queue: QueueKind) -> Result<Option<JobRow>>;

    /// Report milestone progress for a job. Progress never decreases.
    fn update_progress(&self, id: &str, progress: u8) -> Result<()>;

    /// Mark a job completed with its return value.
    fn mark_completed(&self, id: &str, return_value: serde_json::Value) -> Result<()>;

    /// Put a failed attempt back in the queue, gated until `next_attempt_at`.
    fn mark_retry(&self, id: &str, next_attempt_at: i64, failed_reason: &str) -> Result<()>;

    /// Mark a job permanently failed.
    fn mark_failed(&self, id: &str, failed_reason: &str) -> Result<()>;

    /// List jobs across both queues, most recently touched first.
    fn list_recent(&self, limit: usize) -> Result<Vec<JobRow>>;

    /// Aggregate counts across both queues.
    fn summary(&self) -> Result<QueueSummary>;

    /// Delete a job before it is picked up (or after it finished).
    /// Returns true if a row was deleted.
    fn delete_job(&self, id: &str) -> Result<bool>;

    /// Remove every job from both queues. Returns the number deleted.
    fn clear_all(&self) -> Result<usize>;

    /// Keep only the newest `keep_completed` completed and `keep_failed`
    /// failed jobs of a queue. Returns the number trimmed.
    fn trim_finished(&self, queue: QueueKind, keep_completed: usize, keep_failed: usize)
        -> Result<usize>;
}

/// SQLite-backed queue store shared by both queues.
pub struct SqliteJobQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobQueueStore {
    /// Open an existing jobs database or create a new one.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let existed = db_path.as_ref().exists();
        let conn = open_with_schema(
            db_path.as_ref(),
            JOB_QUEUE_SCHEMA_SQL,
            JOB_QUEUE_SCHEMA_VERSION,
        )?;
        if !existed {
            info!("Created new jobs database at {:?}", db_path.as_ref());
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_with_schema(
            JOB_QUEUE_SCHEMA_SQL,
            JOB_QUEUE_SCHEMA_VERSION,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobRow> {
        let data: String = row.get("data")?;
        let return_value: Option<String> = row.get("return_value")?;
        Ok(JobRow {
            id: row.get("id")?,
            queue: QueueKind::parse(&row.get::<_, String>("queue")?)
                .unwrap_or(QueueKind::Download),
            name: row.get("name")?,
            data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
            priority: row.get("priority")?,
            state: JobState::from_db_str(&row.get::<_, String>("state")?),
            progress: row.get::<_, i64>("progress")? as u8,
            attempts_made: row.get("attempts_made")?,
            max_attempts: row.get("max_attempts")?,
            created_at: row.get("created_at")?,
            processed_on: row.get("processed_on")?,
            finished_on: row.get("finished_on")?,
            next_attempt_at: row.get("next_attempt_at")?,
            failed_reason: row.get("failed_reason")?,
            return_value: return_value.and_then(|s| serde_json::from_str(&s).ok()),
        })
    }
}

impl JobQueueStore for SqliteJobQueueStore {
    fn enqueue(
        &self,
        queue: QueueKind,
        data: serde_json::Value,
        priority: i32,
        max_attempts: i32,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO queue_jobs (
                id, queue, name, data, priority, state, progress,
                attempts_made, max_attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'QUEUED', 0, 0, ?6, ?7)"#,
            params![
                id,
                queue.as_str(),
                queue.as_str(),
                serde_json::to_string(&data)?,
                priority,
                max_attempts,
                now_millis(),
            ],
        )
        .context("Failed to enqueue job")?;
        Ok(id)
    }

    fn get_job(&self, id: &str) -> Result<Option<JobRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM queue_jobs WHERE id = ?1")?;
        let job = stmt.query_row([id], Self::row_to_job).optional()?;
        Ok(job)
    }

    fn claim_next(&self, queue: QueueKind) -> Result<Option<JobRow>> {
        let now = now_millis();
        let conn = self.conn.lock().unwrap();

        let candidate: Option<String> = conn
            .query_row(
                r#"SELECT id FROM queue_jobs
                   WHERE queue = ?1 AND state = 'QUEUED'
                     AND (next_attempt_at IS NULL OR next_attempt_at <= ?2)
                   ORDER BY priority ASC, created_at ASC
                   LIMIT 1"#,
                params![queue.as_str(), now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        // Guarded flip; the state check makes a double claim a no-op.
        let changed = conn.execute(
            r#"UPDATE queue_jobs
               SET state = 'ACTIVE',
                   attempts_made = attempts_made + 1,
                   processed_on = ?2,
                   next_attempt_at = NULL
               WHERE id = ?1 AND state = 'QUEUED'"#,
            params![id, now],
        )?;

        if changed == 0 {
            return Ok(None);
        }

        let mut stmt = conn.prepare("SELECT * FROM queue_jobs WHERE id = ?1")?;
        let job = stmt.query_row([id], Self::row_to_job).optional()?;
        Ok(job)
    }

    fn update_progress(&self, id: &str, progress: u8) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE queue_jobs SET progress = MAX(progress, ?2) WHERE id = ?1",
            params![id, progress.min(100) as i64],
        )?;
        Ok(())
    }

    fn mark_completed(&self, id: &str, return_value: serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE queue_jobs
               SET state = 'COMPLETED', progress = 100, finished_on = ?2,
                   return_value = ?3, failed_reason = NULL
               WHERE id = ?1"#,
            params![id, now_millis(), serde_json::to_string(&return_value)?],
        )?;
        Ok(())
    }

    fn mark_retry(&self, id: &str, next_attempt_at: i64, failed_reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE queue_jobs
               SET state = 'QUEUED', next_attempt_at = ?2, failed_reason = ?3
               WHERE id = ?1"#,
            params![id, next_attempt_at, failed_reason],
        )?;
        Ok(())
    }

    fn mark_failed(&self, id: &str, failed_reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE queue_jobs
               SET state = 'FAILED', finished_on = ?2, failed_reason = ?3
               WHERE id = ?1"#,
            params![id, now_millis(), failed_reason],
        )?;
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<JobRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM queue_jobs
               ORDER BY COALESCE(finished_on, processed_on, created_at) DESC
               LIMIT ?1"#,
        )?;
        let jobs = stmt
            .query_map([limit as i64], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn summary(&self) -> Result<QueueSummary> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT state, COUNT(*) FROM queue_jobs GROUP BY state")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut summary = QueueSummary::default();
        for (state, count) in counts {
            summary.total += count;
            match JobState::from_db_str(&state) {
                JobState::Queued => summary.waiting += count,
                JobState::Active => summary.active += count,
                JobState::Completed => summary.completed += count,
                JobState::Failed => summary.failed += count,
            }
        }
        Ok(summary)
    }

    fn delete_job(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM queue_jobs WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn clear_all(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM queue_jobs", [])?;
        Ok(deleted)
    }

    fn trim_finished(
        &self,
        queue: QueueKind,
        keep_completed: usize,
        keep_failed: usize,
    ) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let mut trimmed = 0;
        for (state, keep) in [("COMPLETED", keep_completed), ("FAILED", keep_failed)] {
            trimmed += conn.execute(
                r#"DELETE FROM queue_jobs
                   WHERE queue = ?1 AND state = ?2 AND id NOT IN (
                       SELECT id FROM queue_jobs
                       WHERE queue = ?1 AND state = ?2
                       ORDER BY finished_on DESC
                       LIMIT ?3
                   )"#,
                params![queue.as_str(), state, keep as i64],
            )?;
        }
        Ok(trimmed)
    }
}
