//! One-shot REST fetches that seed the synchronizers.

use async_trait::async_trait;

use crate::config::DEFAULT_API_URL;
use crate::error::SyncError;
use crate::types::{ChatMessage, MetricsSnapshot};

/// Source of the initial state that live updates are layered on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BaselineSource: Send + Sync {
    /// Persisted history of a room, oldest first
    async fn chat_history(&self, room_id: &str) -> Result<Vec<ChatMessage>, SyncError>;

    /// Latest metrics snapshot
    async fn metrics(&self) -> Result<MetricsSnapshot, SyncError>;
}

/// `BaselineSource` backed by the REST API.
#[derive(Debug, Clone)]
pub struct HttpBaselineSource {
    client: reqwest::Client,
    api_url: String,
}

impl Default for HttpBaselineSource {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl HttpBaselineSource {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn history_url(&self, room_id: &str) -> String {
        format!("{}/chat/{}/history", self.api_url, room_id)
    }

    pub fn metrics_url(&self) -> String {
        format!("{}/metrics", self.api_url)
    }
}

#[async_trait]
impl BaselineSource for HttpBaselineSource {
    async fn chat_history(&self, room_id: &str) -> Result<Vec<ChatMessage>, SyncError> {
        let url = self.history_url(room_id);
        tracing::debug!("Fetching history: {}", url);
        let history = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ChatMessage>>()
            .await?;
        tracing::info!("Fetched {} history messages for room '{}'", history.len(), room_id);
        Ok(history)
    }

    async fn metrics(&self) -> Result<MetricsSnapshot, SyncError> {
        let url = self.metrics_url();
        tracing::debug!("Fetching metrics baseline: {}", url);
        let snapshot = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<MetricsSnapshot>()
            .await?;
        Ok(snapshot)
    }
}
