//! SQLite store for acquisition settings.

use super::{
    AcquisitionOptions, AcquisitionSettings, AudioFormat, AudioQuality, CoverFormat, LyricsFormat,
};
use crate::sqlite_persistence::{now_secs, open_with_schema};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SETTINGS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS acquisition_settings (
    friend_id INTEGER PRIMARY KEY,
    audio_quality TEXT NOT NULL DEFAULT 'best',
    audio_format TEXT NOT NULL DEFAULT 'm4a',
    save_cover INTEGER NOT NULL DEFAULT 0,
    cover_format TEXT NOT NULL DEFAULT 'jpg',
    save_lyrics INTEGER NOT NULL DEFAULT 0,
    lyrics_format TEXT NOT NULL DEFAULT 'lrc',
    overwrite_existing INTEGER NOT NULL DEFAULT 0,
    skip_music_videos INTEGER NOT NULL DEFAULT 1,
    max_retries INTEGER NOT NULL DEFAULT 3,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

const SETTINGS_SCHEMA_VERSION: i32 = 1;

/// Trait for the acquisition settings store.
pub trait SettingsStore: Send + Sync {
    /// Get settings for a friend, inserting the defaults row if absent.
    fn read_or_default(&self, friend_id: i64) -> Result<AcquisitionSettings>;

    /// Apply a partial update and return the resulting settings.
    fn update(&self, friend_id: i64, patch: &AcquisitionOptions) -> Result<AcquisitionSettings>;
}

/// SQLite implementation of SettingsStore.
pub struct SqliteSettingsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettingsStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let existed = db_path.as_ref().exists();
        let conn = open_with_schema(
            db_path.as_ref(),
            SETTINGS_SCHEMA_SQL,
            SETTINGS_SCHEMA_VERSION,
        )?;
        if !existed {
            info!("Created new settings database at {:?}", db_path.as_ref());
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_with_schema(
            SETTINGS_SCHEMA_SQL,
            SETTINGS_SCHEMA_VERSION,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_settings(row: &rusqlite::Row) -> rusqlite::Result<AcquisitionSettings> {
        Ok(AcquisitionSettings {
            friend_id: row.get("friend_id")?,
            audio_quality: AudioQuality::parse(&row.get::<_, String>("audio_quality")?)
                .unwrap_or(AudioQuality::Best),
            audio_format: AudioFormat::parse(&row.get::<_, String>("audio_format")?)
                .unwrap_or(AudioFormat::M4a),
            save_cover: row.get::<_, i64>("save_cover")? != 0,
            cover_format: CoverFormat::parse(&row.get::<_, String>("cover_format")?)
                .unwrap_or(CoverFormat::Jpg),
            save_lyrics: row.get::<_, i64>("save_lyrics")? != 0,
            lyrics_format: LyricsFormat::parse(&row.get::<_, String>("lyrics_format")?)
                .unwrap_or(LyricsFormat::Lrc),
            overwrite_existing: row.get::<_, i64>("overwrite_existing")? != 0,
            skip_music_videos: row.get::<_, i64>("skip_music_videos")? != 0,
            max_retries: row.get("max_retries")?,
        })
    }

    fn ensure_row(conn: &Connection, friend_id: i64) -> Result<()> {
        let now = now_secs();
        conn.execute(
            r#"INSERT OR IGNORE INTO acquisition_settings (friend_id, created_at, updated_at)
               VALUES (?1, ?2, ?2)"#,
            params![friend_id, now],
        )?;
        Ok(())
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn read_or_default(&self, friend_id: i64) -> Result<AcquisitionSettings> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, friend_id)?;
        let settings = conn
            .query_row(
                "SELECT * FROM acquisition_settings WHERE friend_id = ?1",
                [friend_id],
                Self::row_to_settings,
            )
            .context("Failed to read acquisition settings")?;
        Ok(settings)
    }

    fn update(&self, friend_id: i64, patch: &AcquisitionOptions) -> Result<AcquisitionSettings> {
        let conn = self.conn.lock().unwrap();
        Self::ensure_row(&conn, friend_id)?;

        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(v) = patch.audio_quality {
            sets.push(format!("audio_quality = ?{}", sets.len() + 1));
            values.push(Box::new(v.as_str().to_string()));
        }
        if let Some(v) = patch.audio_format {
            sets.push(format!("audio_format = ?{}", sets.len() + 1));
            values.push(Box::new(v.as_str().to_string()));
        }
        if let Some(v) = patch.save_cover {
            sets.push(format!("save_cover = ?{}", sets.len() + 1));
            values.push(Box::new(v as i64));
        }
        if let Some(v) = patch.cover_format {
            sets.push(format!("cover_format = ?{}", sets.len() + 1));
            values.push(Box::new(v.as_str().to_string()));
        }
        if let Some(v) = patch.save_lyrics {
            sets.push(format!("save_lyrics = ?{}", sets.len() + 1));
            values.push(Box::new(v as i64));
        }
        if let Some(v) = patch.lyrics_format {
            sets.push(format!("lyrics_format = ?{}", sets.len() + 1));
            values.push(Box::new(v.as_str().to_string()));
        }
        if let Some(v) = patch.overwrite_existing {
            sets.push(format!("overwrite_existing = ?{}", sets.len() + 1));
            values.push(Box::new(v as i64));
        }
        if let Some(v) = patch.skip_music_videos {
            sets.push(format!("skip_music_videos = ?{}", sets.len() + 1));
            values.push(Box::new(v as i64));
        }
        if let Some(v) = patch.max_retries {
            sets.push(format!("max_retries = ?{}", sets.len() + 1));
            values.push(Box::new(v));
        }

        if !sets.is_empty() {
            sets.push(format!("updated_at = ?{}", sets.len() + 1));
            values.push(Box::new(now_secs()));

            let sql = format!(
                "UPDATE acquisition_settings SET {} WHERE friend_id = ?{}",
                sets.join(", "),
                sets.len() + 1
            );
            values.push(Box::new(friend_id));

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();
            conn.execute(&sql, params_refs.as_slice())
                .context("Failed to update acquisition settings")?;
        }

        let settings = conn.query_row(
            "SELECT * FROM acquisition_settings WHERE friend_id = ?1",
            [friend_id],
            Self::row_to_settings,
        )?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_or_default_seeds_defaults() {
        let store = SqliteSettingsStore::in_memory().unwrap();

        let settings = store.read_or_default(42).unwrap();
        assert_eq!(settings, AcquisitionSettings::defaults_for(42));

        // Second read returns the same stored row.
        let again = store.read_or_default(42).unwrap();
        assert_eq!(again, settings);
    }

    #[test]
    fn test_update_partial_fields() {
        let store = SqliteSettingsStore::in_memory().unwrap();

        let patch = AcquisitionOptions {
            audio_format: Some(AudioFormat::Mp3),
            save_lyrics: Some(true),
            ..Default::default()
        };
        let updated = store.update(7, &patch).unwrap();

        assert_eq!(updated.audio_format, AudioFormat::Mp3);
        assert!(updated.save_lyrics);
        assert_eq!(updated.audio_quality, AudioQuality::Best);

        // Persisted.
        let read = store.read_or_default(7).unwrap();
        assert_eq!(read, updated);
    }

    #[test]
    fn test_update_empty_patch_is_noop() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        let before = store.read_or_default(1).unwrap();
        let after = store.update(1, &AcquisitionOptions::default()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_settings_are_per_friend() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store
            .update(
                1,
                &AcquisitionOptions {
                    max_retries: Some(9),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(store.read_or_default(1).unwrap().max_retries, 9);
        assert_eq!(store.read_or_default(2).unwrap().max_retries, 3);
    }
}
