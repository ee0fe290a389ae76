//! Instant-availability checks against provider gateways.
//!
//! All hashes go to a provider in one batch. A transient failure is retried
//! exactly once with the first hash moved to the end of the batch, so a single
//! hash the provider chokes on does not sit at the head of the request twice.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::metrics;
use crate::scraper::SearchResult;

use super::selectable::has_playable_file;
use super::{
    AvailabilityError, DebridError, InstantAvailabilityMap, ProviderGateway, ProviderKind,
};

/// What a provider reported for one hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashAvailability {
    /// A cached variant contains a playable file.
    pub available: bool,
    /// Cached variants were listed and none had a playable file.
    pub no_videos: bool,
}

/// Outcome of one batched availability call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityBatch {
    pub provider: ProviderKind,
    /// Hashes in the order of the request that succeeded.
    pub submitted: Vec<String>,
    /// 1 when the first request succeeded, 2 after a retry.
    pub attempts: u32,
    pub entries: HashMap<String, HashAvailability>,
}

impl AvailabilityBatch {
    pub fn get(&self, hash: &str) -> HashAvailability {
        self.entries.get(hash).copied().unwrap_or_default()
    }

    pub fn available_count(&self) -> usize {
        self.entries.values().filter(|a| a.available).count()
    }
}

/// Reduce the provider response to one verdict per hash.
fn interpret(map: &InstantAvailabilityMap) -> HashMap<String, HashAvailability> {
    map.iter()
        .map(|(hash, variants)| {
            let available = variants.iter().any(has_playable_file);
            let listed_files = variants.iter().any(|v| !v.files.is_empty());
            (
                hash.clone(),
                HashAvailability {
                    available,
                    no_videos: !available && listed_files,
                },
            )
        })
        .collect()
}

fn set_flag(result: &mut SearchResult, provider: ProviderKind, value: bool) {
    match provider {
        ProviderKind::RealDebrid => result.rd_available = value,
        ProviderKind::AllDebrid => result.ad_available = value,
    }
}

/// Hashes worth checking: results already marked `no_videos` are skipped.
pub fn candidate_hashes(results: &[SearchResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| !r.no_videos)
        .map(|r| r.hash.clone())
        .collect()
}

/// Annotate results with a batch outcome.
///
/// Availability flags only move from false to true here; use
/// [`reset_flags`] before a recheck to allow corrections.
pub fn apply(results: &mut [SearchResult], batch: &AvailabilityBatch) {
    apply_batches(results, &[batch]);
}

/// Annotate results with the outcomes of several providers at once.
///
/// Availability wins over `no_videos`: a result is only marked `no_videos`
/// when no provider has it available, and a result that becomes available
/// loses the mark. The outcome does not depend on batch order.
pub fn apply_batches(results: &mut [SearchResult], batches: &[&AvailabilityBatch]) {
    for result in results.iter_mut() {
        let mut listed_without_videos = false;
        for batch in batches {
            let Some(verdict) = batch.entries.get(&result.hash) else {
                continue;
            };
            if verdict.available {
                set_flag(result, batch.provider, true);
            } else if verdict.no_videos {
                listed_without_videos = true;
            }
        }

        if result.rd_available || result.ad_available {
            result.no_videos = false;
        } else if listed_without_videos {
            result.no_videos = true;
        }
    }
}

/// Clear one provider's availability flags.
pub fn reset_flags(results: &mut [SearchResult], provider: ProviderKind) {
    for result in results.iter_mut() {
        set_flag(result, provider, false);
    }
}

/// Runs availability checks for a set of provider gateways.
pub struct AvailabilityResolver {
    gateways: Vec<Arc<dyn ProviderGateway>>,
}

impl AvailabilityResolver {
    pub fn new(gateways: Vec<Arc<dyn ProviderGateway>>) -> Self {
        Self { gateways }
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        self.gateways.iter().map(|g| g.kind()).collect()
    }

    fn gateway(&self, provider: ProviderKind) -> Option<&Arc<dyn ProviderGateway>> {
        self.gateways.iter().find(|g| g.kind() == provider)
    }

    /// One batched call with a single rotated retry on transient failure.
    pub async fn fetch(
        gateway: &dyn ProviderGateway,
        hashes: Vec<String>,
    ) -> Result<AvailabilityBatch, AvailabilityError> {
        let provider = gateway.kind();
        let mut submitted = hashes;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match gateway.instant_availability(&submitted).await {
                Ok(map) => {
                    metrics::AVAILABILITY_ATTEMPTS
                        .with_label_values(&[provider.as_str(), "success"])
                        .inc();
                    let entries = interpret(&map);
                    debug!(
                        provider = provider.as_str(),
                        hashes = submitted.len(),
                        attempts = attempts,
                        "Availability batch complete"
                    );
                    return Ok(AvailabilityBatch {
                        provider,
                        submitted,
                        attempts,
                        entries,
                    });
                }
                Err(DebridError::NoCredential(kind)) => {
                    metrics::AVAILABILITY_ATTEMPTS
                        .with_label_values(&[provider.as_str(), "failed"])
                        .inc();
                    return Err(AvailabilityError::NoCredential(kind));
                }
                Err(e) if e.is_transient() => {
                    metrics::AVAILABILITY_ATTEMPTS
                        .with_label_values(&[provider.as_str(), "transient"])
                        .inc();
                    if attempts >= 2 {
                        return Err(AvailabilityError::Transient {
                            attempts,
                            source: e,
                        });
                    }
                    warn!(
                        provider = provider.as_str(),
                        error = %e,
                        "Availability batch failed, retrying with rotated hashes"
                    );
                    if !submitted.is_empty() {
                        submitted.rotate_left(1);
                    }
                }
                Err(e) => {
                    metrics::AVAILABILITY_ATTEMPTS
                        .with_label_values(&[provider.as_str(), "failed"])
                        .inc();
                    return Err(AvailabilityError::Provider(e));
                }
            }
        }
    }

    /// Check `results` against one provider and annotate them.
    ///
    /// Returns the number of hashes found available.
    pub async fn check(
        &self,
        provider: ProviderKind,
        results: &mut [SearchResult],
    ) -> Result<usize, AvailabilityError> {
        let gateway = self
            .gateway(provider)
            .ok_or(AvailabilityError::NoCredential(provider))?;
        let hashes = candidate_hashes(results);
        if hashes.is_empty() {
            return Ok(0);
        }

        let batch = Self::fetch(gateway.as_ref(), hashes).await?;
        apply(results, &batch);
        Ok(batch.available_count())
    }

    /// Explicit recheck: clear the provider's flags, then check again.
    pub async fn recheck(
        &self,
        provider: ProviderKind,
        results: &mut [SearchResult],
    ) -> Result<usize, AvailabilityError> {
        let gateway = self
            .gateway(provider)
            .ok_or(AvailabilityError::NoCredential(provider))?;
        let hashes = candidate_hashes(results);
        if hashes.is_empty() {
            return Ok(0);
        }

        // Fetch before clearing so a failed recheck leaves flags untouched
        let batch = Self::fetch(gateway.as_ref(), hashes).await?;
        reset_flags(results, provider);
        apply(results, &batch);
        Ok(batch.available_count())
    }

    /// Check every provider concurrently.
    ///
    /// Branches run independently; a failing provider does not affect the
    /// others. Successful batches are applied together once all branches
    /// have finished.
    pub async fn check_providers(
        &self,
        results: &mut [SearchResult],
    ) -> Vec<(ProviderKind, Result<usize, AvailabilityError>)> {
        let hashes = candidate_hashes(results);
        if hashes.is_empty() {
            return self.gateways.iter().map(|g| (g.kind(), Ok(0))).collect();
        }

        let branches = self.gateways.iter().map(|gateway| {
            let hashes = hashes.clone();
            async move { (gateway.kind(), Self::fetch(gateway.as_ref(), hashes).await) }
        });
        let outcomes = futures::future::join_all(branches).await;

        let batches: Vec<&AvailabilityBatch> =
            outcomes.iter().filter_map(|(_, o)| o.as_ref().ok()).collect();
        apply_batches(results, &batches);

        outcomes
            .into_iter()
            .map(|(provider, outcome)| match outcome {
                Ok(batch) => (provider, Ok(batch.available_count())),
                Err(e) => {
                    warn!(provider = provider.as_str(), error = %e, "Availability check failed");
                    (provider, Err(e))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debrid::{AvailabilityVariant, InstantFile};
    use crate::testing::MockGateway;

    fn hash(n: u8) -> String {
        format!("{:040x}", n)
    }

    fn result(n: u8) -> SearchResult {
        SearchResult {
            hash: hash(n),
            title: format!("Result {}", n),
            file_size: 1,
            rd_available: false,
            ad_available: false,
            no_videos: false,
        }
    }

    fn variant(names: &[&str]) -> AvailabilityVariant {
        AvailabilityVariant {
            files: names
                .iter()
                .map(|n| InstantFile {
                    filename: n.to_string(),
                    filesize: 100,
                })
                .collect(),
        }
    }

    #[test]
    fn test_interpret_variants() {
        let mut map = InstantAvailabilityMap::new();
        map.insert(hash(1), vec![variant(&["a.rar"]), variant(&["a.mkv"])]);
        map.insert(hash(2), vec![variant(&["a.rar", "a.nfo"])]);
        map.insert(hash(3), vec![]);

        let entries = interpret(&map);
        assert!(entries[&hash(1)].available);
        assert!(!entries[&hash(2)].available);
        assert!(entries[&hash(2)].no_videos);
        assert_eq!(entries[&hash(3)], HashAvailability::default());
    }

    #[test]
    fn test_apply_is_monotonic() {
        let mut results = vec![result(1), result(2), result(3)];
        results[0].rd_available = true;
        results[2].no_videos = true;

        let batch = AvailabilityBatch {
            provider: ProviderKind::RealDebrid,
            submitted: vec![hash(1), hash(2)],
            attempts: 1,
            entries: HashMap::from([
                (hash(1), HashAvailability::default()),
                (
                    hash(2),
                    HashAvailability {
                        available: true,
                        no_videos: false,
                    },
                ),
                (
                    hash(3),
                    HashAvailability {
                        available: true,
                        no_videos: false,
                    },
                ),
            ]),
        };
        apply(&mut results, &batch);

        assert!(results[0].rd_available); // never regresses
        assert!(results[1].rd_available);
        assert!(!results[1].ad_available);
        // A later available verdict lifts an earlier no_videos mark
        assert!(results[2].rd_available && !results[2].no_videos);
    }

    fn verdict(available: bool, no_videos: bool) -> HashAvailability {
        HashAvailability {
            available,
            no_videos,
        }
    }

    #[test]
    fn test_available_wins_over_no_videos_in_any_order() {
        let rd = AvailabilityBatch {
            provider: ProviderKind::RealDebrid,
            submitted: vec![hash(1), hash(2)],
            attempts: 1,
            entries: HashMap::from([(hash(1), verdict(false, true)), (hash(2), verdict(false, true))]),
        };
        let ad = AvailabilityBatch {
            provider: ProviderKind::AllDebrid,
            submitted: vec![hash(1), hash(2)],
            attempts: 1,
            entries: HashMap::from([(hash(1), verdict(true, false))]),
        };

        for batches in [[&rd, &ad], [&ad, &rd]] {
            let mut results = vec![result(1), result(2)];
            apply_batches(&mut results, &batches);

            assert!(results[0].ad_available);
            assert!(!results[0].rd_available);
            assert!(!results[0].no_videos);
            // Nobody has hash 2 with videos
            assert!(results[1].no_videos);
        }
    }

    #[test]
    fn test_candidate_hashes_skip_no_videos() {
        let mut results = vec![result(1), result(2)];
        results[0].no_videos = true;
        assert_eq!(candidate_hashes(&results), vec![hash(2)]);
    }

    #[tokio::test]
    async fn test_retry_rotates_first_hash_to_tail() {
        let gateway = MockGateway::new(ProviderKind::RealDebrid);
        gateway
            .set_instant(&hash(2), vec![variant(&["movie.mkv"])])
            .await;
        gateway
            .fail_next_instant(DebridError::Timeout)
            .await;

        let batch = AvailabilityResolver::fetch(&gateway, vec![hash(1), hash(2), hash(3)])
            .await
            .unwrap();

        assert_eq!(batch.attempts, 2);
        assert_eq!(batch.submitted, vec![hash(2), hash(3), hash(1)]);
        assert!(batch.get(&hash(2)).available);

        let calls = gateway.instant_calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec![hash(1), hash(2), hash(3)]);
        assert_eq!(calls[1], vec![hash(2), hash(3), hash(1)]);
    }

    #[tokio::test]
    async fn test_two_transient_failures_surface_error() {
        let gateway = MockGateway::new(ProviderKind::AllDebrid);
        gateway
            .fail_next_instant(DebridError::ConnectionFailed("reset".into()))
            .await;
        gateway
            .fail_next_instant(DebridError::InvalidResponse("garbage".into()))
            .await;

        let result = AvailabilityResolver::fetch(&gateway, vec![hash(1), hash(2)]).await;

        assert!(matches!(
            result,
            Err(AvailabilityError::Transient { attempts: 2, .. })
        ));
        assert_eq!(gateway.instant_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_failure_is_not_retried() {
        let gateway = MockGateway::new(ProviderKind::RealDebrid);
        gateway
            .fail_next_instant(DebridError::ApiError {
                status: 403,
                message: "forbidden".into(),
            })
            .await;

        let result = AvailabilityResolver::fetch(&gateway, vec![hash(1)]).await;
        assert!(matches!(result, Err(AvailabilityError::Provider(_))));
        assert_eq!(gateway.instant_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let gateway = MockGateway::new(ProviderKind::RealDebrid);
        gateway.remove_credential().await;

        let result = AvailabilityResolver::fetch(&gateway, vec![hash(1)]).await;
        assert!(matches!(
            result,
            Err(AvailabilityError::NoCredential(ProviderKind::RealDebrid))
        ));
    }

    #[tokio::test]
    async fn test_check_marks_no_videos() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        gateway.set_instant(&hash(1), vec![variant(&["a.mkv"])]).await;
        gateway.set_instant(&hash(2), vec![variant(&["a.exe"])]).await;
        let resolver = AvailabilityResolver::new(vec![gateway.clone()]);

        let mut results = vec![result(1), result(2), result(3)];
        let available = resolver
            .check(ProviderKind::RealDebrid, &mut results)
            .await
            .unwrap();

        assert_eq!(available, 1);
        assert!(results[0].rd_available);
        assert!(results[1].no_videos);
        assert!(!results[2].rd_available && !results[2].no_videos);

        // no_videos results are not offered again
        resolver
            .check(ProviderKind::RealDebrid, &mut results)
            .await
            .unwrap();
        let calls = gateway.instant_calls().await;
        assert_eq!(calls[1], vec![hash(1), hash(3)]);
    }

    #[tokio::test]
    async fn test_recheck_corrects_stale_flags() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let resolver = AvailabilityResolver::new(vec![gateway.clone()]);
        let mut results = vec![result(1)];
        results[0].rd_available = true;

        resolver
            .check(ProviderKind::RealDebrid, &mut results)
            .await
            .unwrap();
        assert!(results[0].rd_available);

        resolver
            .recheck(ProviderKind::RealDebrid, &mut results)
            .await
            .unwrap();
        assert!(!results[0].rd_available);
    }

    #[tokio::test]
    async fn test_check_providers_absorbs_branch_failure() {
        let rd = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        rd.set_instant(&hash(1), vec![variant(&["a.mkv"])]).await;
        let ad = Arc::new(MockGateway::new(ProviderKind::AllDebrid));
        ad.remove_credential().await;
        let resolver = AvailabilityResolver::new(vec![rd, ad]);

        let mut results = vec![result(1)];
        let outcomes = resolver.check_providers(&mut results).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, ProviderKind::RealDebrid);
        assert!(matches!(outcomes[0].1, Ok(1)));
        assert!(matches!(
            outcomes[1].1,
            Err(AvailabilityError::NoCredential(ProviderKind::AllDebrid))
        ));
        assert!(results[0].rd_available);
        assert!(!results[0].ad_available);
    }

    #[tokio::test]
    async fn test_check_providers_keeps_availability_from_either_provider() {
        for rd_first in [true, false] {
            let rd = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
            rd.set_instant(&hash(1), vec![variant(&["a.rar"])]).await;
            let ad = Arc::new(MockGateway::new(ProviderKind::AllDebrid));
            ad.set_instant(&hash(1), vec![variant(&["a.mkv"])]).await;
            let gateways: Vec<Arc<dyn ProviderGateway>> = if rd_first {
                vec![rd, ad]
            } else {
                vec![ad, rd]
            };
            let resolver = AvailabilityResolver::new(gateways);

            let mut results = vec![result(1)];
            resolver.check_providers(&mut results).await;

            assert!(results[0].ad_available);
            assert!(!results[0].rd_available);
            assert!(!results[0].no_videos);
        }
    }

    #[tokio::test]
    async fn test_check_unconfigured_provider() {
        let resolver = AvailabilityResolver::new(vec![]);
        let mut results = vec![result(1)];
        let outcome = resolver.check(ProviderKind::AllDebrid, &mut results).await;
        assert!(matches!(outcome, Err(AvailabilityError::NoCredential(_))));
    }
}
