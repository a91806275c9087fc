//! Data models for the job queue pair.
//!
//! Defines queues, job states, payloads and the API-facing views.

use serde::{Deserialize, Serialize};

use crate::settings::AcquisitionOptions;

/// The two queues of the pipeline, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Download,
    Analyze,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Download => "download-audio",
            QueueKind::Analyze => "analyze-audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "download-audio" => Some(QueueKind::Download),
            "analyze-audio" => Some(QueueKind::Analyze),
            _ => None,
        }
    }
}

/// State machine of a queue job.
///
/// QUEUED → ACTIVE → (COMPLETED | FAILED), with a failed attempt looping
/// back to QUEUED (gated by next_attempt_at) until attempts are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Active,
    Completed, // terminal
    Failed,    // terminal
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Active => "ACTIVE",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "ACTIVE" => JobState::Active,
            "COMPLETED" => JobState::Completed,
            "FAILED" => JobState::Failed,
            _ => JobState::Queued,
        }
    }

    /// API-facing state name, matching what job watchers expect.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            JobState::Queued => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Job priorities. Lower values are serviced first.
pub mod priority {
    pub const HIGH: i32 = 1;
    pub const NORMAL: i32 = 10;
    pub const LOW: i32 = 20;
}

/// The external downloader tools the source strategy can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloaderKind {
    #[serde(rename = "freyr")]
    Freyr,
    #[serde(rename = "spotdl")]
    Spotdl,
    #[serde(rename = "yt-dlp")]
    Ytdlp,
    #[serde(rename = "scdl")]
    Scdl,
}

impl DownloaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloaderKind::Freyr => "freyr",
            DownloaderKind::Spotdl => "spotdl",
            DownloaderKind::Ytdlp => "yt-dlp",
            DownloaderKind::Scdl => "scdl",
        }
    }
}

/// Payload of a download job.
///
/// At least one source URL must be present for the job to be viable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJobPayload {
    pub track_id: String,
    pub friend_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apple_music_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soundcloud_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_downloader: Option<DownloaderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<AcquisitionOptions>,
}

impl DownloadJobPayload {
    pub fn has_source_url(&self) -> bool {
        self.apple_music_url.is_some()
            || self.spotify_url.is_some()
            || self.youtube_url.is_some()
            || self.soundcloud_url.is_some()
    }
}

/// Payload of an analyze job, produced by a completed download job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeJobPayload {
    pub track_id: String,
    pub friend_id: i64,
    pub wav_file_name: String,
    pub playback_file_name: String,
}

/// A persisted queue job row.
#[derive(Debug, Clone)]
pub struct JobRow {
    /// Unique identifier (UUID).
    pub id: String,
    /// Which queue the job belongs to.
    pub queue: QueueKind,
    /// Job name, same as the queue name for this fixed topology.
    pub name: String,
    /// Payload JSON.
    pub data: serde_json::Value,
    /// Lower value is serviced first; ties break on created_at.
    pub priority: i32,
    pub state: JobState,
    /// Coarse milestone progress, 0-100.
    pub progress: u8,
    /// Number of times a worker has claimed this job.
    pub attempts_made: i32,
    pub max_attempts: i32,
    /// Unix millis.
    pub created_at: i64,
    /// When a worker last claimed the job (Unix millis).
    pub processed_on: Option<i64>,
    /// When the job reached a terminal state (Unix millis).
    pub finished_on: Option<i64>,
    /// Earliest time the next attempt may be claimed (Unix millis).
    pub next_attempt_at: Option<i64>,
    pub failed_reason: Option<String>,
    /// JSON returned by the handler on success.
    pub return_value: Option<serde_json::Value>,
}

impl JobRow {
    /// API view of this job.
    pub fn to_details(&self) -> JobDetails {
        JobDetails {
            id: self.id.clone(),
            name: self.name.clone(),
            queue: match self.queue {
                QueueKind::Download => "download",
                QueueKind::Analyze => "analyze",
            }
            .to_string(),
            state: self.state.as_api_str().to_string(),
            progress: self.progress,
            data: self.data.clone(),
            returnvalue: self.return_value.clone(),
            finished_on: self.finished_on,
            failed_reason: self.failed_reason.clone(),
            attempts_made: self.attempts_made,
            processed_on: self.processed_on,
        }
    }
}

/// API-facing job view.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetails {
    pub id: String,
    pub name: String,
    pub queue: String,
    pub state: String,
    pub progress: u8,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returnvalue: Option<serde_json::Value>,
    #[serde(rename = "finishedOn", skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<i64>,
    #[serde(rename = "failedReason", skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    #[serde(rename = "attemptsMade")]
    pub attempts_made: i32,
    #[serde(rename = "processedOn", skip_serializing_if = "Option::is_none")]
    pub processed_on: Option<i64>,
}

/// Aggregate counts over both queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub total: usize,
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}
