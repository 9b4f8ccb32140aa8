// HTTP client for the fantasy game's public JSON API.
//
// Every response body is kept in a `TtlCache` keyed by request path, so
// repeated lookups within the TTL never hit the network. The client doubles
// as the `HistorySource` for the match-history fan-out.

use crate::cache::TtlCache;
use async_trait::async_trait;
use fplwiz_core::config::SourcesConfig;
use fplwiz_core::history::{HistoryError, HistorySource};
use fplwiz_core::model::{MatchRecord, PlayerId};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("invalid JSON from {url}: {source}")]
    Body { url: String, source: reqwest::Error },
}

// ---------------------------------------------------------------------------
// FplClient
// ---------------------------------------------------------------------------

pub struct FplClient {
    http: reqwest::Client,
    base_url: String,
    cache: Mutex<TtlCache<String, Value>>,
}

impl FplClient {
    pub fn new(sources: &SourcesConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(sources.request_timeout_secs))
            .user_agent(concat!("fplwiz/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SourceError::Client)?;
        Ok(FplClient {
            http,
            base_url: sources.base_url.trim_end_matches('/').to_string(),
            cache: Mutex::new(TtlCache::new(Duration::from_secs(sources.cache_ttl_secs))),
        })
    }

    /// GET `path` under the base URL, served from the cache while fresh.
    async fn get_json(&self, path: &str) -> Result<Value, SourceError> {
        if let Some(hit) = self.cache.lock().await.get(&path.to_string()) {
            debug!(path, "cache hit");
            return Ok(hit);
        }

        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "fetching");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SourceError::Request {
                url: url.clone(),
                source: e,
            })?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Body { url, source: e })?;

        self.cache.lock().await.insert(path.to_string(), body.clone());
        Ok(body)
    }

    pub async fn bootstrap(&self) -> Result<Value, SourceError> {
        self.get_json("bootstrap-static/").await
    }

    pub async fn fixtures(&self) -> Result<Value, SourceError> {
        self.get_json("fixtures/").await
    }

    pub async fn entry_picks(&self, entry: u64, gameweek: u32) -> Result<Value, SourceError> {
        self.get_json(&format!("entry/{entry}/event/{gameweek}/picks/"))
            .await
    }

    pub async fn element_summary(&self, id: PlayerId) -> Result<Value, SourceError> {
        self.get_json(&format!("element-summary/{id}/")).await
    }

    /// Forget every cached response so the next lookups refetch.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    #[serde(default)]
    history: Vec<MatchRecord>,
}

/// The `history` list of an element-summary payload.
pub fn parse_history(summary: &Value) -> Result<Vec<MatchRecord>, serde_json::Error> {
    RawSummary::deserialize(summary).map(|s| s.history)
}

#[async_trait]
impl HistorySource for FplClient {
    async fn fetch_history(&self, id: PlayerId) -> Result<Vec<MatchRecord>, HistoryError> {
        let summary = self
            .element_summary(id)
            .await
            .map_err(|e| HistoryError::Request {
                id,
                message: e.to_string(),
            })?;
        parse_history(&summary).map_err(|e| HistoryError::Malformed {
            id,
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
