//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own in-memory stores. No
//! worker pools run; these tests exercise the HTTP surface and the
//! stores behind it.

use collection_audio_server::job_queue::SqliteJobQueueStore;
use collection_audio_server::job_status::{JobStatusManager, SqliteJobStatusStore};
use collection_audio_server::server::{make_app, ServerState};
use collection_audio_server::settings::SqliteSettingsStore;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated stores.
///
/// When dropped, the server shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    // Keep resources alive until drop
    _temp_audio_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port.
    pub async fn spawn() -> Self {
        let temp_audio_dir = TempDir::new().expect("Failed to create temp audio dir");

        let queue_store =
            Arc::new(SqliteJobQueueStore::in_memory().expect("Failed to create queue store"));
        let settings_store =
            Arc::new(SqliteSettingsStore::in_memory().expect("Failed to create settings store"));
        let status_store =
            Arc::new(SqliteJobStatusStore::in_memory().expect("Failed to create status store"));
        let job_status = Arc::new(JobStatusManager::new(status_store, settings_store.clone()));

        let state = ServerState {
            start_time: Instant::now(),
            hash: "test".to_string(),
            queue_store,
            job_status,
            settings_store,
            download_max_attempts: 3,
            audio_dir: temp_audio_dir.path().to_path_buf(),
        };

        let app = make_app(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test port");
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Test server crashed");
        });

        Self {
            base_url,
            port,
            _temp_audio_dir: temp_audio_dir,
            _shutdown_tx: Some(shutdown_tx),
        }
    }
}
