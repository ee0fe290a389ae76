//! Local mirror of a provider library, keyed by info hash.
//!
//! Records are created optimistically when a torrent is added, corrected by
//! `refresh` from the provider listing, and removed once the provider accepts
//! a delete. Every mutation sets a target state, so replaying a late response
//! leaves the cache as it was.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::scraper::normalize_info_hash;

use super::selectable::selectable_files;
use super::{
    DebridError, DownloadStatus, LifecycleError, ProviderDownloadRecord, ProviderGateway,
    ProviderId, ProviderKind,
};

/// Result of a file selection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// These many files were selected.
    Selected(usize),
    /// The provider has not resolved the magnet yet; nothing to select.
    MetadataPending,
}

/// Lifecycle cache for one provider.
pub struct DownloadsCache {
    gateway: Arc<dyn ProviderGateway>,
    records: RwLock<HashMap<String, ProviderDownloadRecord>>,
    /// Hashes with an add in flight. Only touched while `records` is
    /// write-locked, except for the release in `Reservation::drop`.
    adding: Mutex<HashSet<String>>,
}

/// Claim on a hash for the duration of one `add`. Released on drop, so a
/// failed or abandoned add frees the hash again.
struct Reservation<'a> {
    adding: &'a Mutex<HashSet<String>>,
    hash: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut adding = self.adding.lock().unwrap_or_else(|e| e.into_inner());
        adding.remove(&self.hash);
    }
}

impl DownloadsCache {
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self {
            gateway,
            records: RwLock::new(HashMap::new()),
            adding: Mutex::new(HashSet::new()),
        }
    }

    /// Check that `hash` may be added and claim it until the returned
    /// reservation is dropped.
    async fn reserve(&self, hash: &str) -> Result<Reservation<'_>, LifecycleError> {
        let records = self.records.write().await;
        if let Some(existing) = records.get(hash) {
            if existing.status.is_active() {
                return Err(LifecycleError::AlreadyInLibrary {
                    hash: hash.to_string(),
                    status: existing.status,
                });
            }
        }

        let mut adding = self.adding.lock().unwrap_or_else(|e| e.into_inner());
        if !adding.insert(hash.to_string()) {
            return Err(LifecycleError::AlreadyInLibrary {
                hash: hash.to_string(),
                status: DownloadStatus::Downloading,
            });
        }
        drop(adding);
        drop(records);

        Ok(Reservation {
            adding: &self.adding,
            hash: hash.to_string(),
        })
    }

    pub fn provider(&self) -> ProviderKind {
        self.gateway.kind()
    }

    fn record_action(&self, action: &str, result: &str) {
        metrics::LIFECYCLE_ACTIONS
            .with_label_values(&[self.provider().as_str(), action, result])
            .inc();
    }

    fn check_provider(&self, provider_id: &ProviderId) -> Result<(), LifecycleError> {
        if provider_id.kind() == self.provider() {
            Ok(())
        } else {
            Err(LifecycleError::UnknownProvider(provider_id.to_string()))
        }
    }

    /// Add a torrent to the provider library and select its files.
    ///
    /// `instant` marks the record `downloaded` right away (the hash was
    /// reported as cached). If the torrent holds nothing playable it is
    /// deleted again and `NoPlayableFiles` is returned. A concurrent add of
    /// the same hash is rejected with `AlreadyInLibrary`.
    pub async fn add(
        &self,
        hash: &str,
        instant: bool,
    ) -> Result<ProviderDownloadRecord, LifecycleError> {
        let hash =
            normalize_info_hash(hash).ok_or_else(|| LifecycleError::InvalidHash(hash.to_string()))?;

        let reservation = self.reserve(&hash).await?;

        let remote_id = match self.gateway.add_magnet(&hash).await {
            Ok(id) => id,
            Err(e) => {
                self.record_action("add", "failed");
                return Err(gateway_error(e));
            }
        };

        let (status, progress) = if instant {
            (DownloadStatus::Downloaded, 100)
        } else {
            (DownloadStatus::Downloading, 0)
        };
        let record = ProviderDownloadRecord {
            provider_id: ProviderId::new(self.provider(), remote_id),
            hash: hash.clone(),
            status,
            progress,
        };
        self.upsert(record.clone()).await;
        drop(reservation);
        self.record_action("add", "success");
        info!(
            provider = self.provider().as_str(),
            hash = %hash,
            id = %record.provider_id,
            "Added torrent"
        );

        self.select_files(&record.provider_id).await?;
        Ok(record)
    }

    /// Select the playable files of a remote torrent.
    ///
    /// With nothing playable the remote torrent is deleted, the local record
    /// dropped, and `NoPlayableFiles` returned.
    pub async fn select_files(
        &self,
        provider_id: &ProviderId,
    ) -> Result<SelectionOutcome, LifecycleError> {
        self.check_provider(provider_id)?;
        let remote_id = provider_id.remote_id();

        let info = self
            .gateway
            .torrent_info(remote_id)
            .await
            .map_err(|e| self.selection_error(provider_id, e))?;

        if info.metadata_pending {
            debug!(id = %provider_id, "Torrent metadata pending, skipping selection");
            return Ok(SelectionOutcome::MetadataPending);
        }

        let file_ids: Vec<u64> = selectable_files(&info.files).iter().map(|f| f.id).collect();
        if file_ids.is_empty() {
            warn!(id = %provider_id, "No playable files, deleting torrent");
            if let Err(e) = self.gateway.delete_torrent(remote_id).await {
                warn!(id = %provider_id, error = %e, "Cleanup delete failed");
            } else {
                self.remove_by_id(provider_id).await;
            }
            self.record_action("select", "no_playable_files");
            return Err(LifecycleError::NoPlayableFiles {
                provider_id: provider_id.clone(),
            });
        }

        self.gateway
            .select_files(remote_id, &file_ids)
            .await
            .map_err(|e| self.selection_error(provider_id, e))?;

        self.record_action("select", "success");
        debug!(id = %provider_id, files = file_ids.len(), "Selected files");
        Ok(SelectionOutcome::Selected(file_ids.len()))
    }

    fn selection_error(&self, provider_id: &ProviderId, e: DebridError) -> LifecycleError {
        self.record_action("select", "failed");
        match e {
            DebridError::NoCredential(kind) => LifecycleError::NoCredential(kind),
            e if e.is_transient() => LifecycleError::SelectionFailed {
                provider_id: provider_id.clone(),
                source: e,
            },
            e => LifecycleError::Conflict {
                provider_id: provider_id.clone(),
                source: e,
            },
        }
    }

    /// Replace local state with the provider listing.
    ///
    /// Records the provider knows are overwritten, records it does not are
    /// pruned, and new remote torrents are added. When the provider lists a
    /// hash more than once the first entry wins. Returns the record count.
    pub async fn refresh(&self) -> Result<usize, LifecycleError> {
        let remote = match self.gateway.list_all().await {
            Ok(remote) => remote,
            Err(e) => {
                self.record_action("refresh", "failed");
                return Err(gateway_error(e));
            }
        };

        let mut fresh: HashMap<String, ProviderDownloadRecord> = HashMap::new();
        for record in remote {
            fresh.entry(record.hash.clone()).or_insert(record);
        }

        let count = fresh.len();
        let mut records = self.records.write().await;
        let pruned = records.keys().filter(|h| !fresh.contains_key(*h)).count();
        *records = fresh;
        drop(records);

        self.record_action("refresh", "success");
        debug!(
            provider = self.provider().as_str(),
            count = count,
            pruned = pruned,
            "Refreshed library"
        );
        Ok(count)
    }

    /// Delete a remote torrent, then drop its local record.
    ///
    /// If the provider refuses, the local record is kept.
    pub async fn delete(&self, provider_id: &ProviderId) -> Result<(), LifecycleError> {
        self.check_provider(provider_id)?;

        if let Err(e) = self.gateway.delete_torrent(provider_id.remote_id()).await {
            self.record_action("delete", "failed");
            return Err(match e {
                DebridError::NoCredential(kind) => LifecycleError::NoCredential(kind),
                e if e.is_transient() => LifecycleError::Gateway(e),
                e => LifecycleError::Conflict {
                    provider_id: provider_id.clone(),
                    source: e,
                },
            });
        }

        self.remove_by_id(provider_id).await;
        self.record_action("delete", "success");
        info!(id = %provider_id, "Deleted torrent");
        Ok(())
    }

    /// Insert or overwrite the record for its hash.
    pub async fn upsert(&self, record: ProviderDownloadRecord) {
        self.records
            .write()
            .await
            .insert(record.hash.clone(), record);
    }

    /// Drop every record with this provider id. Unknown ids are ignored.
    pub async fn remove_by_id(&self, provider_id: &ProviderId) {
        self.records
            .write()
            .await
            .retain(|_, r| &r.provider_id != provider_id);
    }

    pub async fn get(&self, hash: &str) -> Option<ProviderDownloadRecord> {
        self.records.read().await.get(hash).cloned()
    }

    pub async fn is_downloaded(&self, hash: &str) -> bool {
        self.status(hash).await == Some(DownloadStatus::Downloaded)
    }

    pub async fn is_downloading(&self, hash: &str) -> bool {
        self.status(hash).await == Some(DownloadStatus::Downloading)
    }

    pub async fn not_in_library(&self, hash: &str) -> bool {
        !self.records.read().await.contains_key(hash)
    }

    async fn status(&self, hash: &str) -> Option<DownloadStatus> {
        self.records.read().await.get(hash).map(|r| r.status)
    }

    /// All records, sorted by hash.
    pub async fn records(&self) -> Vec<ProviderDownloadRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.hash.cmp(&b.hash));
        records
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn gateway_error(e: DebridError) -> LifecycleError {
    match e {
        DebridError::NoCredential(kind) => LifecycleError::NoCredential(kind),
        e => LifecycleError::Gateway(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockGateway};

    fn hash(n: u8) -> String {
        format!("{:040x}", n)
    }

    fn cache_with(gateway: &Arc<MockGateway>) -> DownloadsCache {
        DownloadsCache::new(gateway.clone())
    }

    #[tokio::test]
    async fn test_add_then_query() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        let h = hash(1);
        assert!(cache.not_in_library(&h).await);

        let record = cache.add(&h, false).await.unwrap();

        assert_eq!(record.provider_id.kind(), ProviderKind::RealDebrid);
        assert!(cache.is_downloading(&h).await);
        assert!(!cache.is_downloaded(&h).await);
        assert!(!cache.not_in_library(&h).await);
        assert_eq!(gateway.selected_files(record.provider_id.remote_id()).await, Some(vec![1]));
    }

    #[tokio::test]
    async fn test_instant_add_is_downloaded() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::AllDebrid));
        let cache = cache_with(&gateway);

        let record = cache.add(&hash(2), true).await.unwrap();

        assert_eq!(record.status, DownloadStatus::Downloaded);
        assert_eq!(record.progress, 100);
        assert!(cache.is_downloaded(&hash(2)).await);
    }

    #[tokio::test]
    async fn test_add_rejects_active_record() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        cache.add(&hash(1), true).await.unwrap();

        let again = cache.add(&hash(1), false).await;

        assert!(matches!(
            again,
            Err(LifecycleError::AlreadyInLibrary {
                status: DownloadStatus::Downloaded,
                ..
            })
        ));
        assert_eq!(gateway.remote_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_adds_of_same_hash_create_one_torrent() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        let h = hash(1);

        let (first, second) = tokio::join!(cache.add(&h, false), cache.add(&h, false));

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(LifecycleError::AlreadyInLibrary {
                status: DownloadStatus::Downloading,
                ..
            })
        ));
        assert_eq!(gateway.remote_count().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_add_releases_hash() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        gateway.remove_credential().await;
        assert!(cache.add(&hash(1), false).await.is_err());

        // A leaked claim would surface as AlreadyInLibrary here
        assert!(matches!(
            cache.add(&hash(1), false).await,
            Err(LifecycleError::NoCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_add_allowed_after_error_status() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        cache
            .upsert(ProviderDownloadRecord {
                provider_id: ProviderId::new(ProviderKind::RealDebrid, "old"),
                hash: hash(1),
                status: DownloadStatus::Error,
                progress: 0,
            })
            .await;

        let record = cache.add(&hash(1), false).await.unwrap();
        assert_ne!(record.provider_id.remote_id(), "old");
        assert!(cache.is_downloading(&hash(1)).await);
    }

    #[tokio::test]
    async fn test_add_without_playable_files_cleans_up() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        gateway
            .set_files(&hash(3), fixtures::junk_files())
            .await;
        let cache = cache_with(&gateway);

        let result = cache.add(&hash(3), false).await;

        assert!(matches!(result, Err(LifecycleError::NoPlayableFiles { .. })));
        assert!(cache.not_in_library(&hash(3)).await);
        assert_eq!(gateway.remote_count().await, 0);
        assert_eq!(gateway.deleted().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_with_pending_metadata_keeps_record() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        gateway.set_metadata_pending(&hash(4)).await;
        let cache = cache_with(&gateway);

        let record = cache.add(&hash(4), false).await.unwrap();

        assert!(cache.is_downloading(&hash(4)).await);
        assert_eq!(gateway.selected_files(record.provider_id.remote_id()).await, None);
    }

    #[tokio::test]
    async fn test_add_selection_failure_is_distinct() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        gateway.fail_next_select(DebridError::Timeout).await;
        let cache = cache_with(&gateway);

        let result = cache.add(&hash(5), false).await;

        assert!(matches!(result, Err(LifecycleError::SelectionFailed { .. })));
        // The remote torrent exists, so the record stays
        assert!(cache.is_downloading(&hash(5)).await);
    }

    #[tokio::test]
    async fn test_add_without_credential() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        gateway.remove_credential().await;
        let cache = cache_with(&gateway);

        let result = cache.add(&hash(1), false).await;
        assert!(matches!(
            result,
            Err(LifecycleError::NoCredential(ProviderKind::RealDebrid))
        ));
        assert!(cache.not_in_library(&hash(1)).await);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_hash() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        assert!(matches!(
            cache.add("not-a-hash", false).await,
            Err(LifecycleError::InvalidHash(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_round_trip() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        let record = cache.add(&hash(1), false).await.unwrap();

        cache.delete(&record.provider_id).await.unwrap();

        assert!(cache.not_in_library(&hash(1)).await);
        assert_eq!(gateway.remote_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_rejected_keeps_record() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        let record = cache.add(&hash(1), false).await.unwrap();
        gateway
            .fail_next_delete(DebridError::NotFound(record.provider_id.remote_id().to_string()))
            .await;

        let result = cache.delete(&record.provider_id).await;

        assert!(matches!(result, Err(LifecycleError::Conflict { .. })));
        assert!(cache.is_downloading(&hash(1)).await);
    }

    #[tokio::test]
    async fn test_delete_other_provider_id() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        let result = cache
            .delete(&ProviderId::new(ProviderKind::AllDebrid, "9"))
            .await;
        assert!(matches!(result, Err(LifecycleError::UnknownProvider(_))));
    }

    #[tokio::test]
    async fn test_refresh_corrects_prunes_and_is_idempotent() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        let kept = cache.add(&hash(1), false).await.unwrap();
        let gone = cache.add(&hash(2), false).await.unwrap();

        gateway.set_progress(kept.provider_id.remote_id(), 100).await;
        gateway.remove_remote(gone.provider_id.remote_id()).await;
        gateway.insert_remote(&hash(3), DownloadStatus::Downloading, 40).await;

        let count = cache.refresh().await.unwrap();
        assert_eq!(count, 2);
        assert!(cache.is_downloaded(&hash(1)).await);
        assert!(cache.not_in_library(&hash(2)).await);
        assert_eq!(cache.get(&hash(3)).await.unwrap().progress, 40);

        let first = cache.records().await;
        cache.refresh().await.unwrap();
        assert_eq!(cache.records().await, first);
    }

    #[tokio::test]
    async fn test_late_upsert_is_idempotent() {
        let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
        let cache = cache_with(&gateway);
        let record = cache.add(&hash(1), false).await.unwrap();

        cache.upsert(record.clone()).await;
        cache.upsert(record.clone()).await;
        assert_eq!(cache.len().await, 1);

        cache.remove_by_id(&record.provider_id).await;
        cache.remove_by_id(&record.provider_id).await;
        assert!(cache.is_empty().await);
    }
}
