//! Orchestration for the status-store job path.
//!
//! Job creation resolves the friend's stored acquisition preferences once,
//! lets caller-supplied fields override them, and persists a fully
//! composed payload for the worker to pick up.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::store::{JobStatusStore, DEFAULT_LIST_LIMIT};
use super::{JobRecord, JobStatus, JobStatusSummary};
use crate::job_queue::DownloaderKind;
use crate::settings::{AcquisitionOptions, SettingsStore};
use crate::sqlite_persistence::now_millis;

#[derive(Debug, Error)]
pub enum JobStatusError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Caller request to create a status-store download job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDownloadJobRequest {
    pub track_id: String,
    pub friend_id: i64,
    #[serde(default)]
    pub apple_music_url: Option<String>,
    #[serde(default)]
    pub spotify_url: Option<String>,
    #[serde(default)]
    pub youtube_url: Option<String>,
    #[serde(default)]
    pub soundcloud_url: Option<String>,
    #[serde(default)]
    pub preferred_downloader: Option<DownloaderKind>,
    /// Per-request overrides on top of the friend's stored settings.
    #[serde(default)]
    pub options: Option<AcquisitionOptions>,
}

impl CreateDownloadJobRequest {
    fn has_source_url(&self) -> bool {
        self.apple_music_url.is_some()
            || self.spotify_url.is_some()
            || self.youtube_url.is_some()
            || self.soundcloud_url.is_some()
    }
}

/// Facade over the status store and the settings store.
pub struct JobStatusManager {
    store: Arc<dyn JobStatusStore>,
    settings: Arc<dyn SettingsStore>,
}

impl JobStatusManager {
    pub fn new(store: Arc<dyn JobStatusStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self { store, settings }
    }

    /// Create a job record and queue its payload for an external worker.
    ///
    /// Returns the generated job id.
    pub fn create_download_job(
        &self,
        request: &CreateDownloadJobRequest,
    ) -> Result<String, JobStatusError> {
        if request.track_id.is_empty() {
            return Err(JobStatusError::Validation(
                "track_id is required".to_string(),
            ));
        }
        if !request.has_source_url() {
            return Err(JobStatusError::Validation(
                "at least one music service URL is required".to_string(),
            ));
        }

        // Stored per-friend preferences, overridden by request options.
        let mut resolved = self.settings.read_or_default(request.friend_id)?;
        if let Some(overrides) = &request.options {
            resolved = resolved.with_overrides(overrides);
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        let record = JobRecord {
            job_id: job_id.clone(),
            status: JobStatus::Queued,
            progress: 0,
            created_at: now,
            updated_at: now,
            track_id: request.track_id.clone(),
            friend_id: request.friend_id,
            error: None,
            result: None,
        };

        let pending_payload = serde_json::json!({
            "job_id": job_id,
            "track_id": request.track_id,
            "friend_id": request.friend_id,
            "apple_music_url": request.apple_music_url,
            "spotify_url": request.spotify_url,
            "youtube_url": request.youtube_url,
            "soundcloud_url": request.soundcloud_url,
            "preferred_downloader": request.preferred_downloader,
            "options": resolved.to_options(),
        });

        self.store.create_job(&record, &pending_payload)?;
        info!(
            "Created download job {} for track {}",
            job_id, request.track_id
        );
        Ok(job_id)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, JobStatusError> {
        Ok(self.store.get_job(job_id)?)
    }

    pub fn list_jobs(&self) -> Result<Vec<JobRecord>, JobStatusError> {
        Ok(self.store.list_jobs(DEFAULT_LIST_LIMIT)?)
    }

    pub fn summary(&self) -> Result<JobStatusSummary, JobStatusError> {
        Ok(self.store.summary()?)
    }

    pub fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
        result: Option<&serde_json::Value>,
    ) -> Result<bool, JobStatusError> {
        Ok(self
            .store
            .update_status(job_id, status, progress, error, result)?)
    }

    pub fn delete_job(&self, job_id: &str) -> Result<bool, JobStatusError> {
        Ok(self.store.delete_job(job_id)?)
    }

    pub fn clear_all(&self) -> Result<usize, JobStatusError> {
        Ok(self.store.clear_all()?)
    }

    pub fn dequeue_pending(&self) -> Result<Option<serde_json::Value>, JobStatusError> {
        Ok(self.store.dequeue_pending()?)
    }
}
