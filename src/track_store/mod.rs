//! Persistent track records.
//!
//! Only the slice of the catalog the pipeline touches lives here: the
//! source URLs a track was imported with and the audio/analysis fields the
//! pipeline writes back.

mod store;

pub use store::{SqliteTrackStore, TrackStore};

use serde::{Deserialize, Serialize};

use crate::pipeline::TrackAnalysisUpdate;

/// A track record, keyed by (track_id, friend_id).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: String,
    pub friend_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apple_music_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soundcloud_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danceability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

/// The partial update the result writer applies to a track row.
#[derive(Debug, Clone, Default)]
pub struct TrackAudioUpdate {
    pub local_audio_url: Option<String>,
    pub bpm: Option<i64>,
    pub key: Option<String>,
    pub danceability: Option<f64>,
    pub duration_seconds: Option<i64>,
}

impl TrackAudioUpdate {
    pub fn from_analysis(local_audio_url: Option<String>, analysis: &TrackAnalysisUpdate) -> Self {
        Self {
            local_audio_url,
            bpm: analysis.bpm,
            key: analysis.key.clone(),
            danceability: analysis.danceability,
            duration_seconds: analysis.duration_seconds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.local_audio_url.is_none()
            && self.bpm.is_none()
            && self.key.is_none()
            && self.danceability.is_none()
            && self.duration_seconds.is_none()
    }
}
