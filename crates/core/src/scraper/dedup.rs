//! Deduplication and ranking of scraped results by info hash.

use std::collections::HashSet;

use tracing::debug;

use super::{normalize_info_hash, ScrapeSearchResult};

/// Merge result batches and keep only the first occurrence of each hash.
///
/// Batches are concatenated in the order given; the surviving entry for a hash
/// is the first one seen (its title and size win). Hashes are compared in
/// lowercase. Entries without a valid 40-hex hash are dropped.
pub fn flatten_and_remove_duplicates(
    batches: Vec<Vec<ScrapeSearchResult>>,
) -> Vec<ScrapeSearchResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut results = Vec::new();

    for r in batches.into_iter().flatten() {
        let Some(hash) = normalize_info_hash(&r.hash) else {
            debug!(source = %r.source, title = %r.title, "Dropping result without a valid hash");
            continue;
        };
        if seen.insert(hash.clone()) {
            results.push(ScrapeSearchResult { hash, ..r });
        }
    }

    results
}

/// Sort by size, largest first. Equal sizes keep their relative order.
pub fn sort_by_file_size(mut results: Vec<ScrapeSearchResult>) -> Vec<ScrapeSearchResult> {
    // `sort_by` is stable
    results.sort_by(|a, b| b.file_size.cmp(&a.file_size));
    results
}
