//! Shared SQLite persistence helpers.
//!
//! Each store owns its own database file and applies its schema with
//! `IF NOT EXISTS` statements, tracking the schema version in
//! `PRAGMA user_version` so an incompatible database fails fast on open.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) a database at `path` and ensure `schema_sql` is applied.
///
/// `schema_version` is written into `user_version` on first creation and
/// checked on every subsequent open.
pub fn open_with_schema(path: &Path, schema_sql: &str, schema_version: i32) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    init_schema(&conn, schema_sql, schema_version)?;
    Ok(conn)
}

/// In-memory variant for tests.
pub fn open_in_memory_with_schema(schema_sql: &str, schema_version: i32) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn, schema_sql, schema_version)?;
    Ok(conn)
}

fn init_schema(conn: &Connection, schema_sql: &str, schema_version: i32) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    let current: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("Failed to read database version")?;

    if current == 0 {
        conn.execute_batch(schema_sql)
            .context("Failed to apply schema")?;
        conn.execute(&format!("PRAGMA user_version = {}", schema_version), [])?;
        return Ok(());
    }

    if current != schema_version {
        bail!(
            "Database schema version {} is not supported (expected {})",
            current,
            schema_version
        );
    }

    // Re-apply for idempotent additions; statements use IF NOT EXISTS.
    conn.execute_batch(schema_sql)
        .context("Failed to apply schema")?;
    Ok(())
}

/// Current Unix timestamp in seconds.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS things (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
"#;

    #[test]
    fn test_creates_schema_and_version() {
        let conn = open_in_memory_with_schema(TEST_SCHEMA, 3).unwrap();
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 3);

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='things'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rejects_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            open_with_schema(&path, TEST_SCHEMA, 1).unwrap();
        }

        let result = open_with_schema(&path, TEST_SCHEMA, 2);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("schema version 1 is not supported"));
    }

    #[test]
    fn test_reopen_same_version_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let conn = open_with_schema(&path, TEST_SCHEMA, 1).unwrap();
            conn.execute("INSERT INTO things (id, name) VALUES ('a', 'b')", [])
                .unwrap();
        }

        let conn = open_with_schema(&path, TEST_SCHEMA, 1).unwrap();
        let name: String = conn
            .query_row("SELECT name FROM things WHERE id = 'a'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(name, "b");
    }
}
