//! Processing store - persisted scrape result sets and "processing" markers.
//!
//! Scrape jobs write an empty set under `processing:<key>` when they start,
//! save the final list under its own key, then mark the job done.

mod sqlite;

pub use sqlite::SqliteProcessingStore;

use thiserror::Error;

use crate::scraper::SearchResult;

/// Prefix of the marker key written while a scrape is running.
pub const PROCESSING_PREFIX: &str = "processing:";

/// Marker key for a scrape job.
pub fn processing_key(key: &str) -> String {
    format!("{}{}", PROCESSING_PREFIX, key)
}

/// Errors for processing store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key-value storage for scrape result sets.
pub trait ProcessingStore: Send + Sync {
    /// Save a result set under `key`.
    ///
    /// With `replace_existing` the stored set is overwritten; otherwise new
    /// results are appended after the stored ones, skipping known hashes.
    fn save_results(
        &self,
        key: &str,
        results: &[SearchResult],
        replace_existing: bool,
    ) -> Result<(), StoreError>;

    /// Load the result set stored under `key`, if any.
    fn get_results(&self, key: &str) -> Result<Option<Vec<SearchResult>>, StoreError>;

    /// Remove the processing marker for a scrape job.
    fn mark_done(&self, key: &str) -> Result<(), StoreError>;

    /// Whether a scrape job for `key` is still running.
    fn is_processing(&self, key: &str) -> Result<bool, StoreError>;
}
