//! Database schema for jobs.db.

/// SQL schema for the queue jobs database.
pub const JOB_QUEUE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS queue_jobs (
    id TEXT PRIMARY KEY,
    queue TEXT NOT NULL,
    name TEXT NOT NULL,
    data TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 10,
    state TEXT NOT NULL DEFAULT 'QUEUED',
    progress INTEGER NOT NULL DEFAULT 0,
    attempts_made INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 1,

    -- Timestamps (Unix milliseconds)
    created_at INTEGER NOT NULL,
    processed_on INTEGER,
    finished_on INTEGER,
    next_attempt_at INTEGER,

    failed_reason TEXT,
    return_value TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_jobs_claim
    ON queue_jobs(queue, state, priority, created_at);
CREATE INDEX IF NOT EXISTS idx_queue_jobs_finished
    ON queue_jobs(queue, state, finished_on);
"#;

/// Current schema version.
pub const JOB_QUEUE_SCHEMA_VERSION: i32 = 1;
