//! AllDebrid provider gateway (API v4).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::AllDebridConfig;

use super::{
    AvailabilityVariant, DebridError, DownloadStatus, InstantAvailabilityMap, InstantFile,
    ProviderDownloadRecord, ProviderGateway, ProviderId, ProviderKind, TorrentFileEntry,
    TorrentInfo,
};

/// Status code of a magnet that finished downloading.
const STATUS_READY: u32 = 4;

/// AllDebrid client.
///
/// AllDebrid picks files on its own, so `select_files` does nothing.
pub struct AllDebridClient {
    client: Client,
    config: AllDebridConfig,
}

impl AllDebridClient {
    pub fn new(config: AllDebridConfig) -> Result<Self, DebridError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| DebridError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<&str, DebridError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(DebridError::NoCredential(ProviderKind::AllDebrid))
    }

    /// Call an endpoint and unwrap the `{status, data, error}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, DebridError> {
        let url = format!(
            "{}/v4/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        );
        let response = self
            .client
            .get(&url)
            .query(&[("agent", self.config.agent.as_str()), ("apikey", self.api_key()?)])
            .query(params)
            .send()
            .await
            .map_err(DebridError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DebridError::ApiError {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let envelope: AdEnvelope<T> = response
            .json()
            .await
            .map_err(|e| DebridError::InvalidResponse(e.to_string()))?;
        envelope.into_result()
    }
}

#[async_trait]
impl ProviderGateway for AllDebridClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AllDebrid
    }

    async fn add_magnet(&self, hash: &str) -> Result<String, DebridError> {
        let data: AdUploadData = self.call("magnet/upload", &[("magnets[]", hash)]).await?;
        let magnet = data
            .magnets
            .into_iter()
            .next()
            .ok_or_else(|| DebridError::InvalidResponse("no magnet in upload response".into()))?;

        if let Some(error) = magnet.error {
            return Err(DebridError::ApiError {
                status: 400,
                message: format!("{}: {}", error.code, error.message),
            });
        }
        let id = magnet
            .id
            .ok_or_else(|| DebridError::InvalidResponse("magnet upload without id".into()))?;

        debug!(hash = hash, id = id, "Added magnet to AllDebrid");
        Ok(id.to_string())
    }

    async fn torrent_info(&self, id: &str) -> Result<TorrentInfo, DebridError> {
        let data: AdStatusData = self.call("magnet/status", &[("id", id)]).await?;
        match data.magnets {
            AdMagnets::One(magnet) => Ok(magnet.into_info()),
            AdMagnets::Many(magnets) => magnets
                .into_iter()
                .next()
                .map(AdMagnet::into_info)
                .ok_or_else(|| DebridError::NotFound(id.to_string())),
        }
    }

    async fn select_files(&self, _id: &str, _file_ids: &[u64]) -> Result<(), DebridError> {
        Ok(())
    }

    async fn delete_torrent(&self, id: &str) -> Result<(), DebridError> {
        let _: serde_json::Value = self.call("magnet/delete", &[("id", id)]).await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ProviderDownloadRecord>, DebridError> {
        let data: AdStatusData = self.call("magnet/status", &[]).await?;
        let magnets = match data.magnets {
            AdMagnets::One(magnet) => vec![magnet],
            AdMagnets::Many(magnets) => magnets,
        };

        debug!(count = magnets.len(), "Fetched AllDebrid library");
        Ok(magnets.into_iter().map(AdMagnet::into_record).collect())
    }

    async fn instant_availability(
        &self,
        hashes: &[String],
    ) -> Result<InstantAvailabilityMap, DebridError> {
        if hashes.is_empty() {
            return Ok(InstantAvailabilityMap::new());
        }

        let params: Vec<(&str, &str)> = hashes.iter().map(|h| ("magnets[]", h.as_str())).collect();
        let data: AdInstantData = self.call("magnet/instant", &params).await?;

        Ok(data
            .magnets
            .into_iter()
            .map(|m| {
                let variants = if m.instant {
                    let mut files = Vec::new();
                    flatten_files(m.files, &mut files);
                    vec![AvailabilityVariant { files }]
                } else {
                    Vec::new()
                };
                (m.hash.to_ascii_lowercase(), variants)
            })
            .collect())
    }
}

/// Flatten AllDebrid's nested file tree (`e` holds folder entries).
fn flatten_files(entries: Vec<AdFileNode>, out: &mut Vec<InstantFile>) {
    for entry in entries {
        match entry.e {
            Some(children) => flatten_files(children, out),
            None => out.push(InstantFile {
                filename: entry.n,
                filesize: entry.s.unwrap_or(0),
            }),
        }
    }
}

fn map_status(status_code: u32) -> DownloadStatus {
    match status_code {
        STATUS_READY => DownloadStatus::Downloaded,
        0..=3 => DownloadStatus::Downloading,
        _ => DownloadStatus::Error,
    }
}

// AllDebrid API response types
#[derive(Debug, Deserialize)]
struct AdEnvelope<T> {
    status: String,
    data: Option<T>,
    error: Option<AdError>,
}

#[derive(Debug, Deserialize)]
struct AdError {
    code: String,
    message: String,
}

impl<T> AdEnvelope<T> {
    fn into_result(self) -> Result<T, DebridError> {
        if self.status == "success" {
            return self
                .data
                .ok_or_else(|| DebridError::InvalidResponse("missing data".into()));
        }

        let error = self.error.unwrap_or(AdError {
            code: "UNKNOWN".to_string(),
            message: "unknown error".to_string(),
        });
        match error.code.as_str() {
            "MAGNET_INVALID_ID" => Err(DebridError::NotFound(error.message)),
            "AUTH_MISSING_APIKEY" | "AUTH_BAD_APIKEY" => {
                Err(DebridError::NoCredential(ProviderKind::AllDebrid))
            }
            _ => Err(DebridError::ApiError {
                status: 400,
                message: format!("{}: {}", error.code, error.message),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdUploadData {
    magnets: Vec<AdUploadedMagnet>,
}

#[derive(Debug, Deserialize)]
struct AdUploadedMagnet {
    id: Option<u64>,
    error: Option<AdError>,
}

#[derive(Debug, Deserialize)]
struct AdStatusData {
    magnets: AdMagnets,
}

/// `magnet/status` returns an object for a single id, an array otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AdMagnets {
    One(AdMagnet),
    Many(Vec<AdMagnet>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdMagnet {
    id: u64,
    filename: String,
    hash: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    downloaded: u64,
    status_code: u32,
    #[serde(default)]
    links: Vec<AdLink>,
}

#[derive(Debug, Deserialize)]
struct AdLink {
    filename: String,
    #[serde(default)]
    size: u64,
}

impl AdMagnet {
    fn progress(&self, status: DownloadStatus) -> u8 {
        if status == DownloadStatus::Downloaded {
            return 100;
        }
        if self.size == 0 {
            return 0;
        }
        ((self.downloaded as f64 / self.size as f64) * 100.0)
            .round()
            .clamp(0.0, 100.0) as u8
    }

    fn into_record(self) -> ProviderDownloadRecord {
        let status = map_status(self.status_code);
        ProviderDownloadRecord {
            progress: self.progress(status),
            provider_id: ProviderId::new(ProviderKind::AllDebrid, self.id.to_string()),
            hash: self.hash.to_ascii_lowercase(),
            status,
        }
    }

    /// Files are only known once links exist; before that the magnet counts
    /// as pending.
    fn into_info(self) -> TorrentInfo {
        let status = map_status(self.status_code);
        TorrentInfo {
            progress: self.progress(status),
            metadata_pending: self.links.is_empty() && self.status_code < STATUS_READY,
            id: self.id.to_string(),
            filename: self.filename,
            hash: self.hash.to_ascii_lowercase(),
            status,
            files: self
                .links
                .into_iter()
                .enumerate()
                .map(|(i, link)| TorrentFileEntry {
                    id: i as u64,
                    path: link.filename,
                    bytes: link.size,
                    selected: true,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdInstantData {
    magnets: Vec<AdInstantMagnet>,
}

#[derive(Debug, Deserialize)]
struct AdInstantMagnet {
    hash: String,
    #[serde(default)]
    instant: bool,
    #[serde(default)]
    files: Vec<AdFileNode>,
}

#[derive(Debug, Deserialize)]
struct AdFileNode {
    n: String,
    s: Option<u64>,
    e: Option<Vec<AdFileNode>>,
}
