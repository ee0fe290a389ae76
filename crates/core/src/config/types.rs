use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::scraper::DEFAULT_MIN_TITLE_SIMILARITY;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub real_debrid: Option<RealDebridConfig>,
    #[serde(default)]
    pub all_debrid: Option<AllDebridConfig>,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Scrape fan-out and matching configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Title/phrasing jobs in flight at once
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    /// Fraction of target keywords a candidate title must contain
    #[serde(default = "default_min_title_similarity")]
    pub min_title_similarity: f32,
    #[serde(default)]
    pub jackett: Option<JackettConfig>,
    #[serde(default)]
    pub prowlarr: Option<ProwlarrConfig>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            min_title_similarity: default_min_title_similarity(),
            jackett: None,
            prowlarr: None,
        }
    }
}

fn default_max_concurrent_queries() -> usize {
    4
}

fn default_min_title_similarity() -> f32 {
    DEFAULT_MIN_TITLE_SIMILARITY
}

/// Jackett indexer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JackettConfig {
    /// Jackett server URL (e.g., "http://localhost:9117")
    pub url: String,
    pub api_key: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

/// Prowlarr indexer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProwlarrConfig {
    /// Prowlarr server URL (e.g., "http://localhost:9696")
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

/// Real-Debrid provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RealDebridConfig {
    #[serde(default = "default_real_debrid_url")]
    pub base_url: String,
    /// OAuth access token; provider actions fail with NoCredential without it
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for RealDebridConfig {
    fn default() -> Self {
        Self {
            base_url: default_real_debrid_url(),
            access_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_real_debrid_url() -> String {
    "https://api.real-debrid.com".to_string()
}

/// AllDebrid provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AllDebridConfig {
    #[serde(default = "default_all_debrid_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Agent name sent with every request
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for AllDebridConfig {
    fn default() -> Self {
        Self {
            base_url: default_all_debrid_url(),
            api_key: None,
            agent: default_agent(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_all_debrid_url() -> String {
    "https://api.alldebrid.com".to_string()
}

fn default_agent() -> String {
    "dmm".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dmm.db")
}

/// Sanitized config for display (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub scraper: SanitizedScraperConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_debrid: Option<SanitizedProviderConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_debrid: Option<SanitizedProviderConfig>,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedScraperConfig {
    pub max_concurrent_queries: usize,
    pub min_title_similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jackett: Option<SanitizedSourceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prowlarr: Option<SanitizedSourceConfig>,
}

/// Sanitized indexer config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSourceConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

/// Sanitized provider config (credential hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub base_url: String,
    pub credential_configured: bool,
    pub timeout_secs: u32,
}

fn is_configured(secret: Option<&String>) -> bool {
    secret.is_some_and(|s| !s.is_empty())
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            scraper: SanitizedScraperConfig {
                max_concurrent_queries: config.scraper.max_concurrent_queries,
                min_title_similarity: config.scraper.min_title_similarity,
                jackett: config.scraper.jackett.as_ref().map(|j| SanitizedSourceConfig {
                    url: j.url.clone(),
                    api_key_configured: !j.api_key.is_empty(),
                    timeout_secs: j.timeout_secs,
                }),
                prowlarr: config
                    .scraper
                    .prowlarr
                    .as_ref()
                    .map(|p| SanitizedSourceConfig {
                        url: p.url.clone(),
                        api_key_configured: !p.api_key.is_empty(),
                        timeout_secs: p.timeout_secs,
                    }),
            },
            real_debrid: config
                .real_debrid
                .as_ref()
                .map(|rd| SanitizedProviderConfig {
                    base_url: rd.base_url.clone(),
                    credential_configured: is_configured(rd.access_token.as_ref()),
                    timeout_secs: rd.timeout_secs,
                }),
            all_debrid: config
                .all_debrid
                .as_ref()
                .map(|ad| SanitizedProviderConfig {
                    base_url: ad.base_url.clone(),
                    credential_configured: is_configured(ad.api_key.as_ref()),
                    timeout_secs: ad.timeout_secs,
                }),
            database: config.database.clone(),
        }
    }
}
