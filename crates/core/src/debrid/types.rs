//! Types shared by the provider gateways, the availability resolver and the
//! lifecycle cache.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Debrid provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    RealDebrid,
    AllDebrid,
}

impl ProviderKind {
    /// Short prefix used in provider ids and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::RealDebrid => "rd",
            ProviderKind::AllDebrid => "ad",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::RealDebrid => "Real-Debrid",
            ProviderKind::AllDebrid => "AllDebrid",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rd" | "realdebrid" | "real-debrid" | "real_debrid" => Ok(ProviderKind::RealDebrid),
            "ad" | "alldebrid" | "all-debrid" | "all_debrid" => Ok(ProviderKind::AllDebrid),
            _ => Err(LifecycleError::UnknownProvider(s.to_string())),
        }
    }
}

/// Remote torrent identifier, rendered as `rd:<id>` or `ad:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ProviderId {
    kind: ProviderKind,
    id: String,
}

impl ProviderId {
    pub fn new(kind: ProviderKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Identifier as the provider knows it, without prefix.
    pub fn remote_id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for ProviderId {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| LifecycleError::UnknownProvider(s.to_string()))?;
        if id.is_empty() {
            return Err(LifecycleError::UnknownProvider(s.to_string()));
        }
        Ok(Self::new(prefix.parse()?, id))
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ProviderId {
    type Error = LifecycleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Download state of a torrent in a provider library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Downloading,
    Downloaded,
    Error,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Downloaded => "downloaded",
            DownloadStatus::Error => "error",
        }
    }

    /// Whether the torrent occupies the library (in progress or complete).
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadStatus::Downloading | DownloadStatus::Downloaded)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A torrent in a provider library, keyed by hash in the lifecycle cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDownloadRecord {
    pub provider_id: ProviderId,
    pub hash: String,
    pub status: DownloadStatus,
    /// 0-100.
    pub progress: u8,
}

/// One file inside a remote torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFileEntry {
    pub id: u64,
    pub path: String,
    pub bytes: u64,
    pub selected: bool,
}

/// Details of a remote torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Remote identifier, without prefix.
    pub id: String,
    pub filename: String,
    pub hash: String,
    pub status: DownloadStatus,
    pub progress: u8,
    pub files: Vec<TorrentFileEntry>,
    /// The provider has not resolved the magnet yet, so `files` is not
    /// meaningful.
    #[serde(default)]
    pub metadata_pending: bool,
}

/// A file listed in an instant-availability variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantFile {
    pub filename: String,
    pub filesize: u64,
}

/// One cached file set for a hash (a hoster/variant combination).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityVariant {
    pub files: Vec<InstantFile>,
}

/// Canonical instant-availability response: hash to cached variants.
///
/// A hash that is missing or maps to no variants is not cached.
pub type InstantAvailabilityMap = HashMap<String, Vec<AvailabilityVariant>>;

/// Errors returned by provider gateways.
#[derive(Debug, Error)]
pub enum DebridError {
    #[error("No {0} credential configured")]
    NoCredential(ProviderKind),

    #[error("Provider connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Provider API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl DebridError {
    /// Network failures, malformed responses and 5xx answers are worth one
    /// more try.
    pub fn is_transient(&self) -> bool {
        match self {
            DebridError::ConnectionFailed(_)
            | DebridError::Timeout
            | DebridError::InvalidResponse(_) => true,
            DebridError::ApiError { status, .. } => *status >= 500,
            DebridError::NoCredential(_) | DebridError::NotFound(_) => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DebridError::Timeout
        } else if e.is_decode() {
            DebridError::InvalidResponse(e.to_string())
        } else {
            DebridError::ConnectionFailed(e.to_string())
        }
    }
}

/// Errors from availability checks.
#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("No {0} credential configured")]
    NoCredential(ProviderKind),

    #[error("Availability check failed after {attempts} attempts: {source}")]
    Transient { attempts: u32, source: DebridError },

    #[error("Availability check failed: {0}")]
    Provider(DebridError),
}

/// Errors from library actions (add, select, delete, refresh).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("No {0} credential configured")]
    NoCredential(ProviderKind),

    #[error("Invalid info hash: {0}")]
    InvalidHash(String),

    #[error("Torrent {hash} is already in the library ({status})")]
    AlreadyInLibrary { hash: String, status: DownloadStatus },

    #[error("No playable files in {provider_id}; the torrent was removed")]
    NoPlayableFiles { provider_id: ProviderId },

    #[error("File selection failed for {provider_id}: {source}")]
    SelectionFailed {
        provider_id: ProviderId,
        source: DebridError,
    },

    #[error("Provider rejected the request for {provider_id}: {source}")]
    Conflict {
        provider_id: ProviderId,
        source: DebridError,
    },

    #[error("Provider error: {0}")]
    Gateway(DebridError),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

/// Client for one debrid provider.
///
/// Methods take and return remote ids without the provider prefix; records
/// returned by `list_all` carry full `ProviderId`s.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Provider name for logging.
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Add a torrent by info hash; returns the remote id.
    async fn add_magnet(&self, hash: &str) -> Result<String, DebridError>;

    async fn torrent_info(&self, id: &str) -> Result<TorrentInfo, DebridError>;

    async fn select_files(&self, id: &str, file_ids: &[u64]) -> Result<(), DebridError>;

    async fn delete_torrent(&self, id: &str) -> Result<(), DebridError>;

    /// Every torrent in the user's library.
    async fn list_all(&self) -> Result<Vec<ProviderDownloadRecord>, DebridError>;

    /// Look up many hashes in one request.
    async fn instant_availability(
        &self,
        hashes: &[String],
    ) -> Result<InstantAvailabilityMap, DebridError>;
}
