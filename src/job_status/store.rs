//! SQLite store for status-store jobs and their pending-work list.

use super::{JobRecord, JobStatus, JobStatusSummary};
use crate::sqlite_persistence::{now_millis, open_with_schema};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Default cap for bulk listings.
pub const DEFAULT_LIST_LIMIT: usize = 100;

const JOB_STATUS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS job_status (
    job_id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'queued',
    progress INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    track_id TEXT NOT NULL,
    friend_id INTEGER NOT NULL,
    error TEXT,
    result TEXT
);

-- Work list polled by out-of-process workers, oldest first.
CREATE TABLE IF NOT EXISTS job_status_pending (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_job_status_updated ON job_status(updated_at);
CREATE INDEX IF NOT EXISTS idx_job_status_status ON job_status(status);
"#;

const JOB_STATUS_SCHEMA_VERSION: i32 = 1;

/// Trait for the status-store operations.
pub trait JobStatusStore: Send + Sync {
    /// Persist a new record and push its composed payload onto the
    /// pending-work list.
    fn create_job(&self, record: &JobRecord, pending_payload: &serde_json::Value) -> Result<()>;

    /// Point read by job id.
    fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>>;

    /// Bulk list, most recently updated first, bounded by `limit`.
    fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>>;

    /// Aggregate counts by status.
    fn summary(&self) -> Result<JobStatusSummary>;

    /// Mutate a record in place as a worker reports back.
    ///
    /// Enforces the record invariants: progress is monotonic
    /// non-decreasing, stays below 100 unless completed, and `error` is
    /// stored iff the status is failed. Returns false for unknown jobs.
    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
        result: Option<&serde_json::Value>,
    ) -> Result<bool>;

    /// Delete one record. Returns true when a row was removed.
    fn delete_job(&self, job_id: &str) -> Result<bool>;

    /// Delete all records and drain the pending list. Returns the number
    /// of records removed.
    fn clear_all(&self) -> Result<usize>;

    /// Pop the oldest pending payload for an external worker.
    fn dequeue_pending(&self) -> Result<Option<serde_json::Value>>;
}

/// SQLite implementation of JobStatusStore.
pub struct SqliteJobStatusStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStatusStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let existed = db_path.as_ref().exists();
        let conn = open_with_schema(
            db_path.as_ref(),
            JOB_STATUS_SCHEMA_SQL,
            JOB_STATUS_SCHEMA_VERSION,
        )?;
        if !existed {
            info!("Created new job status database at {:?}", db_path.as_ref());
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_with_schema(
            JOB_STATUS_SCHEMA_SQL,
            JOB_STATUS_SCHEMA_VERSION,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let result: Option<String> = row.get("result")?;
        Ok(JobRecord {
            job_id: row.get("job_id")?,
            status: JobStatus::parse(&row.get::<_, String>("status")?)
                .unwrap_or(JobStatus::Queued),
            progress: row.get::<_, i64>("progress")? as u8,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            track_id: row.get("track_id")?,
            friend_id: row.get("friend_id")?,
            error: row.get("error")?,
            result: result.and_then(|s| serde_json::from_str(&s).ok()),
        })
    }
}

impl JobStatusStore for SqliteJobStatusStore {
    fn create_job(&self, record: &JobRecord, pending_payload: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO job_status (
                job_id, status, progress, created_at, updated_at,
                track_id, friend_id, error, result
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL)"#,
            params![
                record.job_id,
                record.status.as_str(),
                record.progress as i64,
                record.created_at,
                record.updated_at,
                record.track_id,
                record.friend_id,
            ],
        )
        .context("Failed to create job record")?;

        conn.execute(
            "INSERT INTO job_status_pending (payload) VALUES (?1)",
            [serde_json::to_string(pending_payload)?],
        )
        .context("Failed to push pending payload")?;
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM job_status WHERE job_id = ?1")?;
        let record = stmt.query_row([job_id], Self::row_to_record).optional()?;
        Ok(record)
    }

    fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM job_status ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map([limit as i64], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn summary(&self) -> Result<JobStatusSummary> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM job_status GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut summary = JobStatusSummary::default();
        for (status, count) in counts {
            summary.total += count;
            match JobStatus::parse(&status) {
                Some(JobStatus::Queued) | None => summary.queued += count,
                Some(JobStatus::Processing) => summary.processing += count,
                Some(JobStatus::Completed) => summary.completed += count,
                Some(JobStatus::Failed) => summary.failed += count,
            }
        }
        Ok(summary)
    }

    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
        result: Option<&serde_json::Value>,
    ) -> Result<bool> {
        // Progress may reach 100 only alongside completed.
        let capped = match status {
            JobStatus::Completed => 100,
            _ => progress.min(99),
        };
        // Error is stored iff the job failed.
        let error = match status {
            JobStatus::Failed => Some(error.unwrap_or("unknown error").to_string()),
            _ => None,
        };
        let result_json = result.map(serde_json::to_string).transpose()?;

        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"UPDATE job_status
               SET status = ?2,
                   progress = MAX(progress, ?3),
                   updated_at = ?4,
                   error = ?5,
                   result = COALESCE(?6, result)
               WHERE job_id = ?1"#,
            params![job_id, status.as_str(), capped as i64, now_millis(), error, result_json],
        )?;
        Ok(changed > 0)
    }

    fn delete_job(&self, job_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM job_status WHERE job_id = ?1", [job_id])?;
        Ok(deleted > 0)
    }

    fn clear_all(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM job_status", [])?;
        conn.execute("DELETE FROM job_status_pending", [])?;
        info!("Cleared {} job records and the pending list", deleted);
        Ok(deleted)
    }

    fn dequeue_pending(&self) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock().unwrap();
        let next: Option<(i64, String)> = conn
            .query_row(
                "SELECT seq, payload FROM job_status_pending ORDER BY seq ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((seq, payload)) = next else {
            return Ok(None);
        };
        conn.execute("DELETE FROM job_status_pending WHERE seq = ?1", [seq])?;
        Ok(Some(serde_json::from_str(&payload)?))
    }
}
