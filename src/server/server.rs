//! HTTP server assembly and lifecycle.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::info;

use super::queue_routes::make_queue_routes;
use super::state::ServerState;
use super::status_routes::make_status_routes;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    })
}

/// Build the application router.
pub fn make_app(state: ServerState) -> Router {
    let audio_dir = state.audio_dir.clone();
    Router::new()
        .route("/", get(home))
        .merge(make_queue_routes())
        .merge(make_status_routes())
        .nest_service("/api/audio", ServeDir::new(audio_dir))
        .with_state(state)
}

/// Serve until the shutdown token is cancelled.
pub async fn run_server(
    state: ServerState,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
