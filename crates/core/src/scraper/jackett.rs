//! Jackett source adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::JackettConfig;

use super::{hash_from_magnet, normalize_info_hash, RawResult, ScrapeError, SourceAdapter};

/// Queries the aggregate `all` indexer of a Jackett server.
pub struct JackettSource {
    client: Client,
    config: JackettConfig,
}

impl JackettSource {
    pub fn new(config: JackettConfig) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ScrapeError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn build_search_url(&self, query: &str) -> String {
        format!(
            "{}/api/v2.0/indexers/all/results?apikey={}&Query={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&self.config.api_key),
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl SourceAdapter for JackettSource {
    fn name(&self) -> &str {
        "jackett"
    }

    async fn search(
        &self,
        query: &str,
        _target_title: &str,
        _air_date: Option<&str>,
    ) -> Result<Vec<RawResult>, ScrapeError> {
        let url = self.build_search_url(query);
        debug!(query = query, "Searching Jackett");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ScrapeError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let jackett_response: JackettResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::ApiError(format!("Failed to parse response: {}", e)))?;

        let results: Vec<RawResult> = jackett_response
            .Results
            .into_iter()
            .filter_map(JackettResult::into_raw)
            .collect();

        debug!(query = query, results = results.len(), "Jackett search complete");
        Ok(results)
    }
}

// Jackett API response types
#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResponse {
    Results: Vec<JackettResult>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResult {
    Title: String,
    MagnetUri: Option<String>,
    InfoHash: Option<String>,
    Size: Option<i64>,
}

impl JackettResult {
    /// Results without a resolvable info hash are dropped.
    fn into_raw(self) -> Option<RawResult> {
        let hash = self
            .InfoHash
            .as_deref()
            .and_then(normalize_info_hash)
            .or_else(|| self.MagnetUri.as_deref().and_then(hash_from_magnet))?;

        Some(RawResult {
            title: self.Title,
            hash,
            file_size: self.Size.unwrap_or(0).max(0) as u64,
        })
    }
}
