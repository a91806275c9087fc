//! SQLite store for track records.

use super::{Track, TrackAudioUpdate};
use crate::sqlite_persistence::open_with_schema;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const TRACKS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    track_id TEXT NOT NULL,
    friend_id INTEGER NOT NULL,
    title TEXT,
    artist TEXT,
    apple_music_url TEXT,
    spotify_url TEXT,
    youtube_url TEXT,
    soundcloud_url TEXT,
    local_audio_url TEXT,
    bpm REAL,
    key TEXT,
    danceability REAL,
    duration_seconds INTEGER,
    PRIMARY KEY (track_id, friend_id)
);

CREATE INDEX IF NOT EXISTS idx_tracks_friend ON tracks(friend_id);
"#;

const TRACKS_SCHEMA_VERSION: i32 = 1;

/// Trait for track record storage.
pub trait TrackStore: Send + Sync {
    /// Insert or replace a full track row.
    fn upsert_track(&self, track: &Track) -> Result<()>;

    /// Point read by the pipeline's join key.
    fn get_track(&self, track_id: &str, friend_id: i64) -> Result<Option<Track>>;

    /// Apply a partial update, setting only present fields.
    ///
    /// Returns the number of rows changed (0 when the track is unknown).
    fn apply_audio_update(
        &self,
        track_id: &str,
        friend_id: i64,
        update: &TrackAudioUpdate,
    ) -> Result<usize>;
}

/// SQLite implementation of TrackStore.
pub struct SqliteTrackStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrackStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let existed = db_path.as_ref().exists();
        let conn = open_with_schema(db_path.as_ref(), TRACKS_SCHEMA_SQL, TRACKS_SCHEMA_VERSION)?;
        if !existed {
            info!("Created new tracks database at {:?}", db_path.as_ref());
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_with_schema(
            TRACKS_SCHEMA_SQL,
            TRACKS_SCHEMA_VERSION,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<Track> {
        Ok(Track {
            track_id: row.get("track_id")?,
            friend_id: row.get("friend_id")?,
            title: row.get("title")?,
            artist: row.get("artist")?,
            apple_music_url: row.get("apple_music_url")?,
            spotify_url: row.get("spotify_url")?,
            youtube_url: row.get("youtube_url")?,
            soundcloud_url: row.get("soundcloud_url")?,
            local_audio_url: row.get("local_audio_url")?,
            bpm: row.get("bpm")?,
            key: row.get("key")?,
            danceability: row.get("danceability")?,
            duration_seconds: row.get("duration_seconds")?,
        })
    }
}

impl TrackStore for SqliteTrackStore {
    fn upsert_track(&self, track: &Track) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT OR REPLACE INTO tracks (
                track_id, friend_id, title, artist,
                apple_music_url, spotify_url, youtube_url, soundcloud_url,
                local_audio_url, bpm, key, danceability, duration_seconds
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            params![
                track.track_id,
                track.friend_id,
                track.title,
                track.artist,
                track.apple_music_url,
                track.spotify_url,
                track.youtube_url,
                track.soundcloud_url,
                track.local_audio_url,
                track.bpm,
                track.key,
                track.danceability,
                track.duration_seconds,
            ],
        )
        .context("Failed to upsert track")?;
        Ok(())
    }

    fn get_track(&self, track_id: &str, friend_id: i64) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM tracks WHERE track_id = ?1 AND friend_id = ?2")?;
        let track = stmt
            .query_row(params![track_id, friend_id], Self::row_to_track)
            .optional()?;
        Ok(track)
    }

    fn apply_audio_update(
        &self,
        track_id: &str,
        friend_id: i64,
        update: &TrackAudioUpdate,
    ) -> Result<usize> {
        if update.is_empty() {
            return Ok(0);
        }

        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(url) = &update.local_audio_url {
            sets.push(format!("local_audio_url = ?{}", sets.len() + 1));
            values.push(Box::new(url.clone()));
        }
        if let Some(bpm) = update.bpm {
            sets.push(format!("bpm = ?{}", sets.len() + 1));
            values.push(Box::new(bpm as f64));
        }
        if let Some(key) = &update.key {
            sets.push(format!("key = ?{}", sets.len() + 1));
            values.push(Box::new(key.clone()));
        }
        if let Some(danceability) = update.danceability {
            sets.push(format!("danceability = ?{}", sets.len() + 1));
            values.push(Box::new(danceability));
        }
        if let Some(duration) = update.duration_seconds {
            sets.push(format!("duration_seconds = ?{}", sets.len() + 1));
            values.push(Box::new(duration));
        }

        let sql = format!(
            "UPDATE tracks SET {} WHERE track_id = ?{} AND friend_id = ?{}",
            sets.join(", "),
            sets.len() + 1,
            sets.len() + 2
        );
        values.push(Box::new(track_id.to_string()));
        values.push(Box::new(friend_id));

        let conn = self.conn.lock().unwrap();
        let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let changed = conn
            .execute(&sql, params_refs.as_slice())
            .context("Failed to apply track audio update")?;
        Ok(changed)
    }
}
