//! Search index client.
//!
//! The persistent track record is the source of truth; the index is
//! eventually consistent and every push is best-effort. Callers log and
//! swallow index errors.

use async_trait::async_trait;
use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::track_store::Track;

/// Trait for pushing track documents into a search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace the document for a track.
    async fn upsert_track(&self, track: &Track) -> Result<()>;
}

/// HTTP search index client (MeiliSearch-style document API).
pub struct HttpSearchIndex {
    client: reqwest::Client,
    base_url: String,
    index_name: String,
    api_key: Option<String>,
}

impl HttpSearchIndex {
    pub fn new(base_url: String, index_name: String, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create search index HTTP client")?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            index_name,
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn upsert_track(&self, track: &Track) -> Result<()> {
        let url = format!(
            "{}/indexes/{}/documents",
            self.base_url, self.index_name
        );

        let mut request = self.client.post(&url).json(&vec![track]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach search index")?;

        if !response.status().is_success() {
            bail!(
                "Search index upsert failed with status {}",
                response.status()
            );
        }

        debug!(
            "Pushed track {} (friend {}) to search index",
            track.track_id, track.friend_id
        );
        Ok(())
    }
}

/// Index that indexes nothing, for deployments without a search service.
pub struct NoOpSearchIndex;

#[async_trait]
impl SearchIndex for NoOpSearchIndex {
    async fn upsert_track(&self, _track: &Track) -> Result<()> {
        Ok(())
    }
}
