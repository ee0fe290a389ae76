//! Torrent scraping across indexer sources.
//!
//! Source adapters turn a query string into raw candidates. The `Aggregator`
//! fans media queries out across every adapter, merges the batches,
//! deduplicates by info hash, filters out titles that do not match and ranks
//! the survivors by size.

mod aggregator;
mod dedup;
mod jackett;
mod matcher;
mod prowlarr;
mod types;

pub use aggregator::{movie_queries, show_queries, Aggregator, QueryJob};
pub use dedup::{flatten_and_remove_duplicates, sort_by_file_size};
pub use jackett::JackettSource;
pub use matcher::{TitleMatcher, DEFAULT_MIN_TITLE_SIMILARITY};
pub use prowlarr::ProwlarrSource;
pub use types::*;
