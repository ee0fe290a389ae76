//! Fan-out of media queries across source adapters.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::media::{MediaError, MediaQuery, MediaType};
use crate::metrics;
use crate::store::{processing_key, ProcessingStore};

use super::dedup::{flatten_and_remove_duplicates, sort_by_file_size};
use super::matcher::TitleMatcher;
use super::{ScrapeError, ScrapeSearchResult, SearchResult, SourceAdapter};

/// One query phrasing sent to every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryJob {
    /// Full query string, e.g. `"Example" 2020`.
    pub query: String,
    /// Title variant the query was built from.
    pub target_title: String,
}

impl QueryJob {
    fn new(query: String, target_title: &str) -> Self {
        Self {
            query,
            target_title: target_title.to_string(),
        }
    }
}

/// Query phrasings for a movie: per title, quoted title plus year, then the
/// quoted title alone. Without a year only the bare phrasing is issued.
pub fn movie_queries(query: &MediaQuery) -> Vec<QueryJob> {
    let mut jobs = Vec::new();
    for title in &query.titles {
        if let Some(year) = query.year {
            jobs.push(QueryJob::new(format!("\"{}\" {}", title, year), title));
        }
        jobs.push(QueryJob::new(format!("\"{}\"", title), title));
    }
    jobs
}

/// Query phrasings for a show season: per title, `sNN`, `"season N"` and one
/// `sNNeMM` phrasing per requested episode.
pub fn show_queries(query: &MediaQuery, season: u32) -> Vec<QueryJob> {
    let mut jobs = Vec::new();
    for title in &query.titles {
        jobs.push(QueryJob::new(format!("\"{}\" s{:02}", title, season), title));
        jobs.push(QueryJob::new(
            format!("\"{}\" \"season {}\"", title, season),
            title,
        ));
        for episode in &query.episode_numbers {
            jobs.push(QueryJob::new(
                format!("\"{}\" s{:02}e{:02}", title, season, episode),
                title,
            ));
        }
    }
    jobs
}

/// Queries every source adapter for every phrasing of a media query, then
/// deduplicates, filters and ranks the merged results.
pub struct Aggregator {
    sources: Vec<Arc<dyn SourceAdapter>>,
    matcher: TitleMatcher,
    max_concurrent_queries: usize,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn SourceAdapter>>, matcher: TitleMatcher) -> Self {
        Self {
            sources,
            matcher,
            max_concurrent_queries: 4,
        }
    }

    pub fn from_config(sources: Vec<Arc<dyn SourceAdapter>>, config: &ScraperConfig) -> Self {
        Self::new(sources, TitleMatcher::new(config.min_title_similarity))
            .with_max_concurrent_queries(config.max_concurrent_queries)
    }

    /// Limit the number of query phrasings in flight at once (minimum 1).
    pub fn with_max_concurrent_queries(mut self, max: usize) -> Self {
        self.max_concurrent_queries = max.max(1);
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run one phrasing against all sources concurrently.
    ///
    /// Returns one batch per source, in source order. A failing source yields
    /// an empty batch.
    async fn run_job(&self, job: &QueryJob, air_date: Option<&str>) -> Vec<Vec<ScrapeSearchResult>> {
        let searches = self.sources.iter().map(|source| async move {
            let name = source.name();
            match source.search(&job.query, &job.target_title, air_date).await {
                Ok(raw) => {
                    metrics::SOURCE_QUERIES
                        .with_label_values(&[name, "success"])
                        .inc();
                    raw.into_iter()
                        .map(|r| ScrapeSearchResult::from_raw(r, name))
                        .collect()
                }
                Err(e) => {
                    metrics::SOURCE_QUERIES
                        .with_label_values(&[name, "failed"])
                        .inc();
                    let err = ScrapeError::SourceUnavailable {
                        source_name: name.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(source = name, query = %job.query, error = %err, "Source query failed");
                    Vec::new()
                }
            }
        });

        futures::future::join_all(searches).await
    }

    /// Collect raw result batches for a query.
    ///
    /// Batches come back in (phrasing, source) order no matter which request
    /// finishes first.
    pub async fn collect(&self, query: &MediaQuery) -> Vec<Vec<ScrapeSearchResult>> {
        let jobs = match query.season {
            Some(season) => show_queries(query, season),
            None => movie_queries(query),
        };
        debug!(
            identity = %query.identity,
            jobs = jobs.len(),
            sources = self.sources.len(),
            "Starting scrape fan-out"
        );

        let air_date = query.air_date.as_deref();
        stream::iter(jobs.iter())
            .map(|job| self.run_job(job, air_date))
            .buffered(self.max_concurrent_queries)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Fan out, deduplicate by hash, drop mismatches and rank by size.
    pub async fn aggregate(&self, query: &MediaQuery) -> Vec<ScrapeSearchResult> {
        let start = Instant::now();
        let media_type = query.media_type().as_str();

        let batches = self.collect(query).await;
        let unique = flatten_and_remove_duplicates(batches);
        let total = unique.len();
        let matched = self.matcher.filter(query, unique);
        let ranked = sort_by_file_size(matched);

        metrics::SCRAPE_DURATION
            .with_label_values(&[media_type])
            .observe(start.elapsed().as_secs_f64());
        metrics::SCRAPE_RESULTS
            .with_label_values(&[media_type])
            .observe(ranked.len() as f64);

        debug!(
            identity = %query.identity,
            unique = total,
            kept = ranked.len(),
            "Aggregation complete"
        );
        ranked
    }

    /// Scrape a movie and persist the results under `movie:<identity>`.
    ///
    /// Returns the number of results found by this scrape.
    pub async fn scrape_movie(
        &self,
        store: &dyn ProcessingStore,
        query: &MediaQuery,
        replace_existing: bool,
    ) -> Result<usize, ScrapeError> {
        query.expect_media_type(MediaType::Movie)?;
        let key = format!("movie:{}", query.identity);
        self.scrape_into(store, query, &query.identity, &key, replace_existing)
            .await
    }

    /// Scrape one show season and persist the results under
    /// `tv:<identity>:<season>`. A query without a season is rejected.
    pub async fn scrape_show(
        &self,
        store: &dyn ProcessingStore,
        query: &MediaQuery,
        replace_existing: bool,
    ) -> Result<usize, ScrapeError> {
        let Some(season) = query.season else {
            return Err(MediaError::WrongMediaType {
                expected: MediaType::Tv,
                found: query.media_type(),
            }
            .into());
        };
        let job_key = format!("{}:{}", query.identity, season);
        let key = format!("tv:{}", job_key);
        self.scrape_into(store, query, &job_key, &key, replace_existing)
            .await
    }

    async fn scrape_into(
        &self,
        store: &dyn ProcessingStore,
        query: &MediaQuery,
        job_key: &str,
        results_key: &str,
        replace_existing: bool,
    ) -> Result<usize, ScrapeError> {
        store.save_results(&processing_key(job_key), &[], true)?;

        let results: Vec<SearchResult> = self
            .aggregate(query)
            .await
            .into_iter()
            .map(SearchResult::from)
            .collect();

        let saved = store.save_results(results_key, &results, replace_existing);
        // The marker is cleared even when saving failed
        store.mark_done(job_key)?;
        saved?;

        info!(
            key = results_key,
            title = query.primary_title(),
            count = results.len(),
            "Saved scrape results"
        );
        Ok(results.len())
    }
}
