use axum::extract::FromRef;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::job_queue::JobQueueStore;
use crate::job_status::JobStatusManager;
use crate::settings::SettingsStore;

pub type GuardedJobQueueStore = Arc<dyn JobQueueStore>;
pub type GuardedJobStatusManager = Arc<JobStatusManager>;
pub type GuardedSettingsStore = Arc<dyn SettingsStore>;

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub hash: String,
    pub queue_store: GuardedJobQueueStore,
    pub job_status: GuardedJobStatusManager,
    pub settings_store: GuardedSettingsStore,
    /// Attempt budget stamped onto newly enqueued download jobs.
    pub download_max_attempts: i32,
    /// Served at /api/audio for the analysis service to fetch from.
    pub audio_dir: PathBuf,
}

impl FromRef<ServerState> for GuardedJobQueueStore {
    fn from_ref(input: &ServerState) -> Self {
        input.queue_store.clone()
    }
}

impl FromRef<ServerState> for GuardedJobStatusManager {
    fn from_ref(input: &ServerState) -> Self {
        input.job_status.clone()
    }
}

impl FromRef<ServerState> for GuardedSettingsStore {
    fn from_ref(input: &ServerState) -> Self {
        input.settings_store.clone()
    }
}
