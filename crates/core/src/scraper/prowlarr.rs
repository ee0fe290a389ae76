//! Prowlarr source adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ProwlarrConfig;

use super::{hash_from_magnet, normalize_info_hash, RawResult, ScrapeError, SourceAdapter};

/// Queries every indexer configured in a Prowlarr server.
pub struct ProwlarrSource {
    client: Client,
    config: ProwlarrConfig,
}

impl ProwlarrSource {
    pub fn new(config: ProwlarrConfig) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ScrapeError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn build_search_url(&self, query: &str) -> String {
        format!(
            "{}/api/v1/search?type=search&query={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl SourceAdapter for ProwlarrSource {
    fn name(&self) -> &str {
        "prowlarr"
    }

    async fn search(
        &self,
        query: &str,
        _target_title: &str,
        _air_date: Option<&str>,
    ) -> Result<Vec<RawResult>, ScrapeError> {
        debug!(query = query, "Searching Prowlarr");

        let response = self
            .client
            .get(self.build_search_url(query))
            .header("X-Api-Key", &self.config.api_key)
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

        let releases: Vec<ProwlarrRelease> = response
            .json()
            .await
            .map_err(|e| ScrapeError::ApiError(format!("Failed to parse response: {}", e)))?;

        let results: Vec<RawResult> = releases
            .into_iter()
            .filter_map(ProwlarrRelease::into_raw)
            .collect();

        debug!(query = query, results = results.len(), "Prowlarr search complete");
        Ok(results)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProwlarrRelease {
    title: String,
    info_hash: Option<String>,
    magnet_url: Option<String>,
    #[serde(default)]
    size: i64,
}

impl ProwlarrRelease {
    fn into_raw(self) -> Option<RawResult> {
        let hash = self
            .info_hash
            .as_deref()
            .and_then(normalize_info_hash)
            .or_else(|| self.magnet_url.as_deref().and_then(hash_from_magnet))?;

        Some(RawResult {
            title: self.title,
            hash,
            file_size: self.size.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "89abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_build_search_url() {
        let source = ProwlarrSource::new(ProwlarrConfig {
            url: "http://localhost:9696".to_string(),
            api_key: "key".to_string(),
            timeout_secs: 10,
        })
        .unwrap();

        let url = source.build_search_url("\"Show\" s01");
        assert_eq!(
            url,
            "http://localhost:9696/api/v1/search?type=search&query=%22Show%22%20s01"
        );
    }

    #[test]
    fn test_parse_releases() {
        let json = format!(
            r#"[
                {{"title": "Show S01 1080p", "infoHash": "{}", "size": 4096, "indexer": "x"}},
                {{"title": "Show S01 Magnet", "magnetUrl": "magnet:?xt=urn:btih:{}"}},
                {{"title": "Show S01 Link only", "size": 10}}
            ]"#,
            HASH, HASH
        );
        let releases: Vec<ProwlarrRelease> = serde_json::from_str(&json).unwrap();
        let results: Vec<_> = releases
            .into_iter()
            .filter_map(ProwlarrRelease::into_raw)
            .collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_size, 4096);
        assert_eq!(results[1].hash, HASH);
        assert_eq!(results[1].file_size, 0);
    }
}
