//! Types for scraping and aggregating torrent results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaError;
use crate::store::StoreError;

/// A raw candidate returned by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResult {
    /// Release title as reported by the indexer.
    pub title: String,
    /// Info hash (40 lowercase hex characters).
    pub hash: String,
    /// Size in bytes.
    pub file_size: u64,
}

/// A raw result tagged with the source it came from.
///
/// Only lives during aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSearchResult {
    pub title: String,
    pub hash: String,
    pub file_size: u64,
    /// Name of the source adapter that returned this result.
    pub source: String,
}

impl ScrapeSearchResult {
    pub fn from_raw(raw: RawResult, source: impl Into<String>) -> Self {
        Self {
            title: raw.title,
            hash: raw.hash,
            file_size: raw.file_size,
            source: source.into(),
        }
    }
}

/// A deduplicated search result, annotated with provider availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Info hash; unique within a result set.
    pub hash: String,
    pub title: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Instantly available on Real-Debrid.
    #[serde(default)]
    pub rd_available: bool,
    /// Instantly available on AllDebrid.
    #[serde(default)]
    pub ad_available: bool,
    /// A provider listed files for this hash and none were playable.
    /// Once set, the result is no longer offered for availability checks.
    #[serde(default)]
    pub no_videos: bool,
}

impl From<ScrapeSearchResult> for SearchResult {
    fn from(r: ScrapeSearchResult) -> Self {
        Self {
            hash: r.hash,
            title: r.title,
            file_size: r.file_size,
            rd_available: false,
            ad_available: false,
            no_videos: false,
        }
    }
}

/// Normalise an info hash to 40 lowercase hex characters.
///
/// Returns `None` for anything that is not a hex SHA-1 digest.
pub fn normalize_info_hash(hash: &str) -> Option<String> {
    let hash = hash.trim();
    if hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(hash.to_ascii_lowercase())
    } else {
        None
    }
}

/// Extract the info hash from a magnet URI (`xt=urn:btih:<hash>`).
pub fn hash_from_magnet(magnet: &str) -> Option<String> {
    let (_, params) = magnet.split_once('?')?;
    params
        .split('&')
        .filter_map(|param| param.strip_prefix("xt=urn:btih:"))
        .find_map(normalize_info_hash)
}

/// Errors that can occur while scraping.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Source connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Source API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("Invalid media query: {0}")]
    Media(#[from] MediaError),

    #[error("Processing store error: {0}")]
    Store(#[from] StoreError),
}

impl ScrapeError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScrapeError::Timeout
        } else if e.is_connect() {
            ScrapeError::ConnectionFailed(e.to_string())
        } else {
            ScrapeError::ApiError(e.to_string())
        }
    }
}

/// An indexer that can be queried for raw candidates.
///
/// Implementations report failures as errors; the aggregator absorbs them so a
/// failing source contributes nothing instead of aborting the scrape.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source name for logging and provenance.
    fn name(&self) -> &str;

    /// Run one query. `target_title` is the title variant the query was built
    /// from; `air_date` is the release date when known.
    async fn search(
        &self,
        query: &str,
        target_title: &str,
        air_date: Option<&str>,
    ) -> Result<Vec<RawResult>, ScrapeError>;
}
