//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with methods for the server's endpoints. When routes or
//! request formats change, update only this file.

use super::constants::REQUEST_TIMEOUT_SECS;
use reqwest::Response;
use serde_json::Value;
use std::time::Duration;

/// HTTP test client.
pub struct TestClient {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn home(&self) -> Response {
        self.client.get(self.url("/")).send().await.unwrap()
    }

    // === Queue endpoints ===

    pub async fn enqueue_download(&self, body: &Value) -> Response {
        self.client
            .post(self.url("/api/tracks/download"))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn queue_jobs(&self) -> Response {
        self.client
            .get(self.url("/api/queue/jobs"))
            .send()
            .await
            .unwrap()
    }

    pub async fn queue_job(&self, id: &str) -> Response {
        self.client
            .get(self.url(&format!("/api/queue/jobs/{}", id)))
            .send()
            .await
            .unwrap()
    }

    pub async fn delete_queue_job(&self, id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/api/queue/jobs/{}", id)))
            .send()
            .await
            .unwrap()
    }

    pub async fn clear_queue_jobs(&self) -> Response {
        self.client
            .delete(self.url("/api/queue/jobs"))
            .send()
            .await
            .unwrap()
    }

    // === Status-store endpoints ===

    pub async fn create_status_job(&self, body: &Value) -> Response {
        self.client
            .post(self.url("/api/jobs"))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn status_jobs(&self) -> Response {
        self.client.get(self.url("/api/jobs")).send().await.unwrap()
    }

    pub async fn status_job(&self, job_id: &str) -> Response {
        self.client
            .get(self.url(&format!("/api/jobs/{}", job_id)))
            .send()
            .await
            .unwrap()
    }

    pub async fn status_summary(&self) -> Response {
        self.client
            .get(self.url("/api/jobs/summary"))
            .send()
            .await
            .unwrap()
    }

    pub async fn delete_status_job(&self, job_id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/api/jobs/{}", job_id)))
            .send()
            .await
            .unwrap()
    }

    pub async fn clear_status_jobs(&self) -> Response {
        self.client
            .delete(self.url("/api/jobs"))
            .send()
            .await
            .unwrap()
    }

    // === Worker endpoints ===

    pub async fn worker_poll(&self) -> Response {
        self.client
            .post(self.url("/api/worker/poll"))
            .send()
            .await
            .unwrap()
    }

    pub async fn worker_update(&self, job_id: &str, body: &Value) -> Response {
        self.client
            .put(self.url(&format!("/api/worker/jobs/{}/status", job_id)))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    // === Settings endpoints ===

    pub async fn get_settings(&self, friend_id: i64) -> Response {
        self.client
            .get(self.url(&format!(
                "/api/settings/acquisition?friend_id={}",
                friend_id
            )))
            .send()
            .await
            .unwrap()
    }

    pub async fn put_settings(&self, body: &Value) -> Response {
        self.client
            .put(self.url("/api/settings/acquisition"))
            .json(body)
            .send()
            .await
            .unwrap()
    }
}
