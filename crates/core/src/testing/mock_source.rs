//! Mock source adapter for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::scraper::{RawResult, ScrapeError, SourceAdapter};

/// A recorded search call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub query: String,
    pub target_title: String,
    pub air_date: Option<String>,
}

/// Mock implementation of the SourceAdapter trait.
///
/// Results are scripted per exact query string; unknown queries return
/// nothing. Clones share state, so a test can keep a handle after passing
/// the source to an aggregator.
///
/// # Example
///
/// ```rust,ignore
/// let source = MockSource::new("mock");
/// source.add_results("\"Example\" 2020", vec![("Example 2020", hash, 1000)]).await;
///
/// let aggregator = Aggregator::new(vec![Arc::new(source.clone())], TitleMatcher::default());
/// aggregator.aggregate(&query).await;
///
/// assert_eq!(source.recorded_queries().await.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockSource {
    name: String,
    results: Arc<RwLock<HashMap<String, Vec<RawResult>>>>,
    calls: Arc<RwLock<Vec<RecordedQuery>>>,
    /// If set, the next search fails with this error.
    next_error: Arc<RwLock<Option<ScrapeError>>>,
    /// Every search fails.
    failing: Arc<RwLock<bool>>,
}

impl MockSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing: Arc::new(RwLock::new(false)),
        }
    }

    /// Script `(title, hash, size)` results for an exact query string.
    /// Appends to anything already scripted for the query.
    pub async fn add_results(&self, query: &str, results: Vec<(&str, String, u64)>) {
        let raw = results.into_iter().map(|(title, hash, file_size)| RawResult {
            title: title.to_string(),
            hash,
            file_size,
        });
        self.results
            .write()
            .await
            .entry(query.to_string())
            .or_default()
            .extend(raw);
    }

    /// Replace the results for a query.
    pub async fn set_results(&self, query: &str, results: Vec<RawResult>) {
        self.results
            .write()
            .await
            .insert(query.to_string(), results);
    }

    /// Configure the next search to fail with the given error.
    pub async fn set_next_error(&self, error: ScrapeError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every search fail.
    pub async fn fail_all(&self) {
        *self.failing.write().await = true;
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedQuery> {
        self.calls.read().await.clone()
    }

    pub async fn recorded_queries(&self) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .map(|c| c.query.clone())
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        target_title: &str,
        air_date: Option<&str>,
    ) -> Result<Vec<RawResult>, ScrapeError> {
        self.calls.write().await.push(RecordedQuery {
            query: query.to_string(),
            target_title: target_title.to_string(),
            air_date: air_date.map(str::to_string),
        });

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if *self.failing.read().await {
            return Err(ScrapeError::ConnectionFailed(format!(
                "{} is down",
                self.name
            )));
        }

        Ok(self
            .results
            .read()
            .await
            .get(query)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_results_and_recording() {
        let source = MockSource::new("mock");
        source
            .add_results("q", vec![("A", "a".repeat(40), 1)])
            .await;

        let hits = source.search("q", "A", Some("2020-01-01")).await.unwrap();
        let misses = source.search("other", "A", None).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert!(misses.is_empty());
        let calls = source.recorded_calls().await;
        assert_eq!(calls[0].air_date.as_deref(), Some("2020-01-01"));
        assert_eq!(calls[1].query, "other");
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let source = MockSource::new("mock");
        source.set_next_error(ScrapeError::Timeout).await;

        assert!(source.search("q", "q", None).await.is_err());
        assert!(source.search("q", "q", None).await.is_ok());
    }
}
