//! Real-Debrid provider gateway (REST API 1.0).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RealDebridConfig;

use super::{
    AvailabilityVariant, DebridError, DownloadStatus, InstantAvailabilityMap, InstantFile,
    ProviderDownloadRecord, ProviderGateway, ProviderId, ProviderKind, TorrentFileEntry,
    TorrentInfo,
};

/// Page size for torrent and download listings.
const PAGE_LIMIT: usize = 2500;

/// Filename Real-Debrid reports until a magnet has been resolved.
const PENDING_FILENAME: &str = "Magnet";

/// Real-Debrid client.
pub struct RealDebridClient {
    client: Client,
    config: RealDebridConfig,
    page_limit: usize,
}

/// A generated download link from the Real-Debrid downloads list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealDebridDownload {
    pub id: String,
    pub filename: String,
    #[serde(
        default,
        rename(deserialize = "mimeType"),
        skip_serializing_if = "Option::is_none"
    )]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filesize: u64,
    /// Original hoster link.
    pub link: String,
    #[serde(default)]
    pub host: String,
    /// Unrestricted download link.
    pub download: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,
}

impl RealDebridClient {
    pub fn new(config: RealDebridConfig) -> Result<Self, DebridError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| DebridError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            page_limit: PAGE_LIMIT,
        })
    }

    #[cfg(test)]
    fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/rest/1.0{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        )
    }

    fn token(&self) -> Result<&str, DebridError> {
        self.config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(DebridError::NoCredential(ProviderKind::RealDebrid))
    }

    /// Send an authenticated request and check the status code.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, DebridError> {
        let response = request
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(DebridError::from_reqwest)?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(DebridError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DebridError::ApiError {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        Ok(response)
    }

    /// One page of a listing endpoint, with the `X-Total-Count` header if
    /// the provider sent one.
    async fn list_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        page: usize,
    ) -> Result<(Vec<T>, Option<usize>), DebridError> {
        let request = self
            .client
            .get(self.api_url(endpoint))
            .query(&[("page", page), ("limit", self.page_limit)]);
        let response = self.send(request, endpoint.trim_start_matches('/')).await?;

        let total = response
            .headers()
            .get("x-total-count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let items = response
            .json()
            .await
            .map_err(|e| DebridError::InvalidResponse(e.to_string()))?;
        Ok((items, total))
    }

    /// Walk a listing endpoint page by page. Stops on a short page, once
    /// the reported total is reached, or after the first page when no total
    /// is reported.
    async fn list_paginated<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<Vec<T>, DebridError> {
        let mut items: Vec<T> = Vec::new();
        let mut page = 1;

        loop {
            let (batch, total) = self.list_page(endpoint, page).await?;
            let count = batch.len();
            items.extend(batch);

            let Some(total) = total else { break };
            if count < self.page_limit || items.len() >= total {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    /// Every generated download link on the account.
    pub async fn list_downloads(&self) -> Result<Vec<RealDebridDownload>, DebridError> {
        let downloads: Vec<RealDebridDownload> = self.list_paginated("/downloads").await?;
        debug!(count = downloads.len(), "Fetched Real-Debrid downloads");
        Ok(downloads)
    }

    /// Remove a generated link from the downloads list.
    pub async fn delete_download(&self, id: &str) -> Result<(), DebridError> {
        let request = self.client.delete(self.api_url(&format!(
            "/downloads/delete/{}",
            urlencoding::encode(id)
        )));
        self.send(request, id).await?;
        debug!(id = id, "Deleted Real-Debrid download");
        Ok(())
    }
}

#[async_trait]
impl ProviderGateway for RealDebridClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RealDebrid
    }

    async fn add_magnet(&self, hash: &str) -> Result<String, DebridError> {
        let magnet = format!("magnet:?xt=urn:btih:{}", hash);
        let request = self
            .client
            .post(self.api_url("/torrents/addMagnet"))
            .form(&[("magnet", magnet.as_str())]);
        let added: RdAddMagnet = self
            .send(request, hash)
            .await?
            .json()
            .await
            .map_err(|e| DebridError::InvalidResponse(e.to_string()))?;

        debug!(hash = hash, id = %added.id, "Added magnet to Real-Debrid");
        Ok(added.id)
    }

    async fn torrent_info(&self, id: &str) -> Result<TorrentInfo, DebridError> {
        let request = self
            .client
            .get(self.api_url(&format!("/torrents/info/{}", urlencoding::encode(id))));
        let info: RdTorrentInfo = self
            .send(request, id)
            .await?
            .json()
            .await
            .map_err(|e| DebridError::InvalidResponse(e.to_string()))?;
        Ok(info.into())
    }

    async fn select_files(&self, id: &str, file_ids: &[u64]) -> Result<(), DebridError> {
        let files = file_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .client
            .post(self.api_url(&format!(
                "/torrents/selectFiles/{}",
                urlencoding::encode(id)
            )))
            .form(&[("files", files.as_str())]);
        self.send(request, id).await?;
        Ok(())
    }

    async fn delete_torrent(&self, id: &str) -> Result<(), DebridError> {
        let request = self.client.delete(self.api_url(&format!(
            "/torrents/delete/{}",
            urlencoding::encode(id)
        )));
        self.send(request, id).await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ProviderDownloadRecord>, DebridError> {
        let torrents: Vec<RdTorrent> = self.list_paginated("/torrents").await?;
        debug!(count = torrents.len(), "Fetched Real-Debrid library");
        Ok(torrents.into_iter().map(RdTorrent::into_record).collect())
    }

    async fn instant_availability(
        &self,
        hashes: &[String],
    ) -> Result<InstantAvailabilityMap, DebridError> {
        if hashes.is_empty() {
            return Ok(InstantAvailabilityMap::new());
        }

        let request = self.client.get(self.api_url(&format!(
            "/torrents/instantAvailability/{}",
            hashes.join("/")
        )));
        let response: BTreeMap<String, serde_json::Value> = self
            .send(request, "instantAvailability")
            .await?
            .json()
            .await
            .map_err(|e| DebridError::InvalidResponse(e.to_string()))?;

        parse_instant(response)
    }
}

/// Map a Real-Debrid torrent status string.
fn map_status(status: &str) -> DownloadStatus {
    match status {
        "downloaded" => DownloadStatus::Downloaded,
        "magnet_error" | "error" | "virus" | "dead" => DownloadStatus::Error,
        _ => DownloadStatus::Downloading,
    }
}

fn clamp_progress(progress: f64, status: DownloadStatus) -> u8 {
    if status == DownloadStatus::Downloaded {
        100
    } else {
        progress.round().clamp(0.0, 100.0) as u8
    }
}

// Real-Debrid API response types
#[derive(Debug, Deserialize)]
struct RdAddMagnet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RdTorrent {
    id: String,
    hash: String,
    #[serde(default)]
    progress: f64,
    status: String,
}

impl RdTorrent {
    fn into_record(self) -> ProviderDownloadRecord {
        let status = map_status(&self.status);
        ProviderDownloadRecord {
            provider_id: ProviderId::new(ProviderKind::RealDebrid, self.id),
            hash: self.hash.to_ascii_lowercase(),
            status,
            progress: clamp_progress(self.progress, status),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RdTorrentInfo {
    id: String,
    filename: String,
    hash: String,
    #[serde(default)]
    progress: f64,
    status: String,
    #[serde(default)]
    files: Vec<RdTorrentFile>,
}

#[derive(Debug, Deserialize)]
struct RdTorrentFile {
    id: u64,
    path: String,
    bytes: u64,
    selected: u8,
}

impl From<RdTorrentInfo> for TorrentInfo {
    fn from(info: RdTorrentInfo) -> Self {
        let status = map_status(&info.status);
        TorrentInfo {
            metadata_pending: info.filename == PENDING_FILENAME,
            id: info.id,
            filename: info.filename,
            hash: info.hash.to_ascii_lowercase(),
            status,
            progress: clamp_progress(info.progress, status),
            files: info
                .files
                .into_iter()
                .map(|f| TorrentFileEntry {
                    id: f.id,
                    path: f.path,
                    bytes: f.bytes,
                    selected: f.selected == 1,
                })
                .collect(),
        }
    }
}

/// Per-hash availability: hoster name to a list of variants, each a map of
/// file id to file.
type RdHosters = BTreeMap<String, Vec<BTreeMap<String, RdInstantFile>>>;

#[derive(Debug, Deserialize)]
struct RdInstantFile {
    filename: String,
    filesize: u64,
}

/// Uncached hashes come back as an empty array instead of a hoster map.
fn parse_instant(
    response: BTreeMap<String, serde_json::Value>,
) -> Result<InstantAvailabilityMap, DebridError> {
    response
        .into_iter()
        .map(|(hash, entry)| {
            let variants = match entry {
                serde_json::Value::Array(_) => Vec::new(),
                other => {
                    let hosters: RdHosters = serde_json::from_value(other)
                        .map_err(|e| DebridError::InvalidResponse(e.to_string()))?;
                    hosters
                        .into_values()
                        .flatten()
                        .map(|files| AvailabilityVariant {
                            files: files
                                .into_values()
                                .map(|f| InstantFile {
                                    filename: f.filename,
                                    filesize: f.filesize,
                                })
                                .collect(),
                        })
                        .collect()
                }
            };
            Ok((hash.to_ascii_lowercase(), variants))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::RwLock;

    const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HASH_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn test_map_status() {
        assert_eq!(map_status("downloaded"), DownloadStatus::Downloaded);
        assert_eq!(map_status("downloading"), DownloadStatus::Downloading);
        assert_eq!(map_status("waiting_files_selection"), DownloadStatus::Downloading);
        assert_eq!(map_status("queued"), DownloadStatus::Downloading);
        assert_eq!(map_status("magnet_error"), DownloadStatus::Error);
        assert_eq!(map_status("dead"), DownloadStatus::Error);
    }

    #[test]
    fn test_parse_instant_availability() {
        let json = format!(
            r#"{{
                "{}": {{"rd": [
                    {{"1": {{"filename": "Movie.mkv", "filesize": 1000}},
                      "2": {{"filename": "Movie.srt", "filesize": 10}}}},
                    {{"1": {{"filename": "Movie.mkv", "filesize": 1000}}}}
                ]}},
                "{}": []
            }}"#,
            HASH_A.to_uppercase(),
            HASH_B
        );
        let map = parse_instant(serde_json::from_str(&json).unwrap()).unwrap();

        let a = &map[HASH_A];
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].files.len(), 2);
        assert_eq!(a[0].files[0].filename, "Movie.mkv");
        assert!(map[HASH_B].is_empty());
    }

    #[test]
    fn test_parse_instant_rejects_malformed_entry() {
        let json = format!(r#"{{"{}": {{"rd": "nope"}}}}"#, HASH_A);
        assert!(matches!(
            parse_instant(serde_json::from_str(&json).unwrap()),
            Err(DebridError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_torrent_info_metadata_pending() {
        let json = r#"{
            "id": "ABC", "filename": "Magnet", "hash": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "progress": 0, "status": "magnet_conversion", "files": []
        }"#;
        let info: TorrentInfo = serde_json::from_str::<RdTorrentInfo>(json).unwrap().into();
        assert!(info.metadata_pending);
        assert_eq!(info.hash, HASH_A);
        assert_eq!(info.status, DownloadStatus::Downloading);
    }

    #[test]
    fn test_torrent_info_files() {
        let json = r#"{
            "id": "ABC", "filename": "Movie", "hash": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "progress": 100, "status": "downloaded",
            "files": [
                {"id": 1, "path": "/Movie.mkv", "bytes": 1000, "selected": 1},
                {"id": 2, "path": "/Movie.nfo", "bytes": 3, "selected": 0}
            ]
        }"#;
        let info: TorrentInfo = serde_json::from_str::<RdTorrentInfo>(json).unwrap().into();
        assert!(!info.metadata_pending);
        assert_eq!(info.progress, 100);
        assert!(info.files[0].selected);
        assert!(!info.files[1].selected);
    }

    #[test]
    fn test_torrent_into_record() {
        let torrent = RdTorrent {
            id: "XYZ".to_string(),
            hash: HASH_B.to_uppercase(),
            progress: 42.6,
            status: "downloading".to_string(),
        };
        let record = torrent.into_record();
        assert_eq!(record.provider_id.to_string(), "rd:XYZ");
        assert_eq!(record.hash, HASH_B);
        assert_eq!(record.progress, 43);
    }

    #[tokio::test]
    async fn test_actions_without_token_fail_with_no_credential() {
        let client = RealDebridClient::new(RealDebridConfig::default()).unwrap();
        let result = client.add_magnet(HASH_A).await;
        assert!(matches!(
            result,
            Err(DebridError::NoCredential(ProviderKind::RealDebrid))
        ));
    }

    #[tokio::test]
    async fn test_instant_availability_empty_input_skips_request() {
        let client = RealDebridClient::new(RealDebridConfig::default()).unwrap();
        let map = client.instant_availability(&[]).await.unwrap();
        assert!(map.is_empty());
    }

    /// Canned reply for the local API server.
    struct Reply {
        status: u16,
        total: Option<usize>,
        body: String,
    }

    impl Reply {
        fn json(body: serde_json::Value, total: Option<usize>) -> Self {
            Self {
                status: 200,
                total,
                body: body.to_string(),
            }
        }

        fn status(status: u16) -> Self {
            Self {
                status,
                total: None,
                body: String::new(),
            }
        }
    }

    /// Serve `replies` in order, one per connection, on a local port.
    /// Returns the base url and the request heads received so far.
    async fn serve(replies: Vec<Reply>) -> (String, Arc<RwLock<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let heads = Arc::new(RwLock::new(Vec::new()));

        let recorded = heads.clone();
        tokio::spawn(async move {
            for reply in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf: Vec<u8> = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                recorded
                    .write()
                    .await
                    .push(String::from_utf8_lossy(&buf).into_owned());

                let mut response = format!(
                    "HTTP/1.1 {} Reply\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reply.body.len()
                );
                if let Some(total) = reply.total {
                    response.push_str(&format!("X-Total-Count: {}\r\n", total));
                }
                response.push_str("\r\n");
                response.push_str(&reply.body);
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (base_url, heads)
    }

    fn client_for(base_url: String) -> RealDebridClient {
        RealDebridClient::new(RealDebridConfig {
            base_url,
            access_token: Some("token".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn download(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "filename": format!("{}.mkv", id),
            "mimeType": "video/x-matroska",
            "filesize": 1000,
            "link": format!("https://hoster.example/{}", id),
            "host": "hoster.example",
            "chunks": 16,
            "download": format!("https://download.example/{}", id),
            "streamable": 1,
            "generated": "2024-01-01T00:00:00.000Z"
        })
    }

    fn request_line(head: &str) -> &str {
        head.lines().next().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_list_downloads_follows_total_count() {
        let (base_url, heads) = serve(vec![
            Reply::json(serde_json::json!([download("A"), download("B")]), Some(3)),
            Reply::json(serde_json::json!([download("C")]), Some(3)),
        ])
        .await;
        let client = client_for(base_url).with_page_limit(2);

        let downloads = client.list_downloads().await.unwrap();

        let ids: Vec<_> = downloads.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(downloads[0].mime_type.as_deref(), Some("video/x-matroska"));
        assert_eq!(downloads[2].download, "https://download.example/C");

        let heads = heads.read().await;
        assert_eq!(
            request_line(&heads[0]),
            "GET /rest/1.0/downloads?page=1&limit=2 HTTP/1.1"
        );
        assert_eq!(
            request_line(&heads[1]),
            "GET /rest/1.0/downloads?page=2&limit=2 HTTP/1.1"
        );
        assert!(heads[0]
            .to_ascii_lowercase()
            .contains("authorization: bearer token"));
    }

    #[tokio::test]
    async fn test_listing_without_total_stops_after_first_page() {
        let (base_url, heads) = serve(vec![Reply::json(
            serde_json::json!([
                {"id": "T1", "hash": HASH_A, "progress": 100, "status": "downloaded"},
                {"id": "T2", "hash": HASH_B, "progress": 5, "status": "downloading"}
            ]),
            None,
        )])
        .await;
        let client = client_for(base_url).with_page_limit(2);

        let records = client.list_all().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, DownloadStatus::Downloaded);
        assert_eq!(heads.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_download() {
        let (base_url, heads) = serve(vec![Reply::status(204), Reply::status(404)]).await;
        let client = client_for(base_url);

        client.delete_download("ABC").await.unwrap();
        assert!(matches!(
            client.delete_download("ABC").await,
            Err(DebridError::NotFound(id)) if id == "ABC"
        ));

        let heads = heads.read().await;
        assert_eq!(
            request_line(&heads[0]),
            "DELETE /rest/1.0/downloads/delete/ABC HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_downloads_without_token_skip_request() {
        let client = RealDebridClient::new(RealDebridConfig::default()).unwrap();
        assert!(matches!(
            client.list_downloads().await,
            Err(DebridError::NoCredential(ProviderKind::RealDebrid))
        ));
    }
}
