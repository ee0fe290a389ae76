//! Mock provider gateway for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::debrid::{
    AvailabilityVariant, DebridError, DownloadStatus, InstantAvailabilityMap,
    ProviderDownloadRecord, ProviderGateway, ProviderId, ProviderKind, TorrentFileEntry,
    TorrentInfo,
};

use super::fixtures;

/// A torrent held in the mock provider library.
#[derive(Debug, Clone)]
struct RemoteTorrent {
    id: String,
    hash: String,
    status: DownloadStatus,
    progress: u8,
    files: Vec<TorrentFileEntry>,
    metadata_pending: bool,
    selected: Option<Vec<u64>>,
}

/// Mock implementation of the ProviderGateway trait.
///
/// Keeps an in-memory library in insertion order. Torrents added without
/// scripted files get [`fixtures::playable_files`], so selection picks file
/// id 1.
///
/// # Example
///
/// ```rust,ignore
/// let gateway = Arc::new(MockGateway::new(ProviderKind::RealDebrid));
/// gateway.set_files(&hash, fixtures::junk_files()).await;
///
/// let cache = DownloadsCache::new(gateway.clone());
/// assert!(cache.add(&hash, false).await.is_err());
/// assert_eq!(gateway.deleted().await.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockGateway {
    kind: ProviderKind,
    has_credential: Arc<RwLock<bool>>,
    remote: Arc<RwLock<Vec<RemoteTorrent>>>,
    next_id: Arc<RwLock<u64>>,
    /// Files handed to torrents added for these hashes.
    files_by_hash: Arc<RwLock<HashMap<String, Vec<TorrentFileEntry>>>>,
    pending_hashes: Arc<RwLock<HashSet<String>>>,
    instant: Arc<RwLock<InstantAvailabilityMap>>,
    instant_calls: Arc<RwLock<Vec<Vec<String>>>>,
    /// Consumed in order, one per availability call.
    instant_errors: Arc<RwLock<VecDeque<DebridError>>>,
    select_error: Arc<RwLock<Option<DebridError>>>,
    delete_error: Arc<RwLock<Option<DebridError>>>,
    deleted: Arc<RwLock<Vec<String>>>,
}

impl MockGateway {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            has_credential: Arc::new(RwLock::new(true)),
            remote: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(RwLock::new(1)),
            files_by_hash: Arc::new(RwLock::new(HashMap::new())),
            pending_hashes: Arc::new(RwLock::new(HashSet::new())),
            instant: Arc::new(RwLock::new(HashMap::new())),
            instant_calls: Arc::new(RwLock::new(Vec::new())),
            instant_errors: Arc::new(RwLock::new(VecDeque::new())),
            select_error: Arc::new(RwLock::new(None)),
            delete_error: Arc::new(RwLock::new(None)),
            deleted: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Every call fails with `NoCredential` from now on.
    pub async fn remove_credential(&self) {
        *self.has_credential.write().await = false;
    }

    pub async fn set_instant(&self, hash: &str, variants: Vec<AvailabilityVariant>) {
        self.instant
            .write()
            .await
            .insert(hash.to_string(), variants);
    }

    /// Queue a failure for the next availability call. Queued failures are
    /// used up one per call.
    pub async fn fail_next_instant(&self, error: DebridError) {
        self.instant_errors.write().await.push_back(error);
    }

    /// Hash batches passed to `instant_availability`, in call order.
    pub async fn instant_calls(&self) -> Vec<Vec<String>> {
        self.instant_calls.read().await.clone()
    }

    /// Files for torrents added later with this hash.
    pub async fn set_files(&self, hash: &str, files: Vec<TorrentFileEntry>) {
        self.files_by_hash
            .write()
            .await
            .insert(hash.to_string(), files);
    }

    /// Torrents added later with this hash report unresolved metadata.
    pub async fn set_metadata_pending(&self, hash: &str) {
        self.pending_hashes.write().await.insert(hash.to_string());
    }

    pub async fn fail_next_select(&self, error: DebridError) {
        *self.select_error.write().await = Some(error);
    }

    pub async fn fail_next_delete(&self, error: DebridError) {
        *self.delete_error.write().await = Some(error);
    }

    /// File ids selected on a remote torrent, if selection ran.
    pub async fn selected_files(&self, remote_id: &str) -> Option<Vec<u64>> {
        self.remote
            .read()
            .await
            .iter()
            .find(|t| t.id == remote_id)
            .and_then(|t| t.selected.clone())
    }

    pub async fn remote_count(&self) -> usize {
        self.remote.read().await.len()
    }

    /// Remote ids deleted so far.
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }

    /// Set progress on a remote torrent; 100 marks it downloaded.
    pub async fn set_progress(&self, remote_id: &str, progress: u8) {
        let mut remote = self.remote.write().await;
        if let Some(torrent) = remote.iter_mut().find(|t| t.id == remote_id) {
            torrent.progress = progress.min(100);
            torrent.status = if progress >= 100 {
                DownloadStatus::Downloaded
            } else {
                DownloadStatus::Downloading
            };
        }
    }

    /// Drop a torrent as if it was removed on the provider side.
    pub async fn remove_remote(&self, remote_id: &str) {
        self.remote.write().await.retain(|t| t.id != remote_id);
    }

    /// Add a torrent as if it was added on the provider side. Returns its id.
    pub async fn insert_remote(&self, hash: &str, status: DownloadStatus, progress: u8) -> String {
        let id = self.allocate_id().await;
        self.remote.write().await.push(RemoteTorrent {
            id: id.clone(),
            hash: hash.to_string(),
            status,
            progress,
            files: fixtures::playable_files(),
            metadata_pending: false,
            selected: None,
        });
        id
    }

    async fn allocate_id(&self) -> String {
        let mut next = self.next_id.write().await;
        let id = format!("MOCK{}", *next);
        *next += 1;
        id
    }

    async fn check_credential(&self) -> Result<(), DebridError> {
        if *self.has_credential.read().await {
            Ok(())
        } else {
            Err(DebridError::NoCredential(self.kind))
        }
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn add_magnet(&self, hash: &str) -> Result<String, DebridError> {
        // Suspend like a network call would, so concurrent callers interleave
        tokio::task::yield_now().await;
        self.check_credential().await?;

        let id = self.allocate_id().await;
        let files = self
            .files_by_hash
            .read()
            .await
            .get(hash)
            .cloned()
            .unwrap_or_else(fixtures::playable_files);
        let metadata_pending = self.pending_hashes.read().await.contains(hash);

        self.remote.write().await.push(RemoteTorrent {
            id: id.clone(),
            hash: hash.to_string(),
            status: DownloadStatus::Downloading,
            progress: 0,
            files: if metadata_pending { Vec::new() } else { files },
            metadata_pending,
            selected: None,
        });
        Ok(id)
    }

    async fn torrent_info(&self, id: &str) -> Result<TorrentInfo, DebridError> {
        self.check_credential().await?;

        let remote = self.remote.read().await;
        let torrent = remote
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| DebridError::NotFound(id.to_string()))?;

        Ok(TorrentInfo {
            id: torrent.id.clone(),
            filename: format!("{}.torrent", torrent.hash),
            hash: torrent.hash.clone(),
            status: torrent.status,
            progress: torrent.progress,
            files: torrent.files.clone(),
            metadata_pending: torrent.metadata_pending,
        })
    }

    async fn select_files(&self, id: &str, file_ids: &[u64]) -> Result<(), DebridError> {
        self.check_credential().await?;
        if let Some(error) = self.select_error.write().await.take() {
            return Err(error);
        }

        let mut remote = self.remote.write().await;
        let torrent = remote
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| DebridError::NotFound(id.to_string()))?;
        for file in torrent.files.iter_mut() {
            file.selected = file_ids.contains(&file.id);
        }
        torrent.selected = Some(file_ids.to_vec());
        Ok(())
    }

    async fn delete_torrent(&self, id: &str) -> Result<(), DebridError> {
        self.check_credential().await?;
        if let Some(error) = self.delete_error.write().await.take() {
            return Err(error);
        }

        let mut remote = self.remote.write().await;
        let before = remote.len();
        remote.retain(|t| t.id != id);
        if remote.len() == before {
            return Err(DebridError::NotFound(id.to_string()));
        }
        self.deleted.write().await.push(id.to_string());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ProviderDownloadRecord>, DebridError> {
        self.check_credential().await?;

        Ok(self
            .remote
            .read()
            .await
            .iter()
            .map(|t| ProviderDownloadRecord {
                provider_id: ProviderId::new(self.kind, t.id.clone()),
                hash: t.hash.clone(),
                status: t.status,
                progress: t.progress,
            })
            .collect())
    }

    async fn instant_availability(
        &self,
        hashes: &[String],
    ) -> Result<InstantAvailabilityMap, DebridError> {
        self.check_credential().await?;
        self.instant_calls.write().await.push(hashes.to_vec());

        if let Some(error) = self.instant_errors.write().await.pop_front() {
            return Err(error);
        }

        let instant = self.instant.read().await;
        Ok(hashes
            .iter()
            .filter_map(|h| instant.get(h).map(|v| (h.clone(), v.clone())))
            .collect())
    }
}
