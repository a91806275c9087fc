//! HTTP surface: queue ingress and introspection, the status-store job
//! API, worker report-back, acquisition settings, and audio file serving.

mod queue_routes;
pub mod server;
pub mod state;
mod status_routes;

pub use server::{make_app, run_server};
pub use state::ServerState;
