//! Common test infrastructure
//!
//! Spawns an isolated server per test and provides a high-level HTTP
//! client for the API surface. Tests should only import from this module.

mod client;
mod constants;
mod server;

pub use client::TestClient;
#[allow(unused_imports)]
pub use constants::*;
pub use server::TestServer;
