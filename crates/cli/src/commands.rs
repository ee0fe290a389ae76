//! Command handlers. Results go to stdout as JSON, logs to stderr.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;

use dmm_core::scraper::normalize_info_hash;
use dmm_core::{
    AllDebridClient, Aggregator, AvailabilityResolver, Config, DownloadsCache, JackettSource,
    MediaQuery, ProcessingStore, ProviderGateway, ProviderId, ProviderKind, ProwlarrSource,
    RealDebridClient, SearchResult, SourceAdapter, SqliteProcessingStore, TitleMetadata,
};

/// A movie or show scrape as given on the command line.
pub struct ScrapeRequest {
    pub identity: Option<String>,
    pub metadata: TitleMetadata,
    pub season: Option<u32>,
    pub episodes: Vec<u32>,
    pub replace_existing: bool,
}

#[derive(Serialize)]
struct ScrapeReport {
    key: String,
    found: usize,
    stored: usize,
}

#[derive(Serialize)]
struct ProviderOutcome {
    provider: ProviderKind,
    available: Option<usize>,
    error: Option<String>,
}

#[derive(Serialize)]
struct CheckReport {
    providers: Vec<ProviderOutcome>,
    results: Vec<SearchResult>,
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", json);
    Ok(())
}

fn open_store(path: &Path) -> Result<SqliteProcessingStore> {
    SqliteProcessingStore::new(path)
        .with_context(|| format!("Failed to open processing store at {:?}", path))
}

fn build_sources(config: &Config) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    if let Some(jackett) = &config.scraper.jackett {
        info!("Initializing Jackett source at {}", jackett.url);
        sources.push(Arc::new(
            JackettSource::new(jackett.clone()).context("Failed to create Jackett source")?,
        ));
    }
    if let Some(prowlarr) = &config.scraper.prowlarr {
        info!("Initializing Prowlarr source at {}", prowlarr.url);
        sources.push(Arc::new(
            ProwlarrSource::new(prowlarr.clone()).context("Failed to create Prowlarr source")?,
        ));
    }
    Ok(sources)
}

/// Gateway for one provider. An unconfigured provider still gets a client;
/// its calls fail with a missing-credential error.
fn build_gateway(config: &Config, kind: ProviderKind) -> Result<Arc<dyn ProviderGateway>> {
    let gateway: Arc<dyn ProviderGateway> = match kind {
        ProviderKind::RealDebrid => Arc::new(
            RealDebridClient::new(config.real_debrid.clone().unwrap_or_default())
                .context("Failed to create Real-Debrid client")?,
        ),
        ProviderKind::AllDebrid => Arc::new(
            AllDebridClient::new(config.all_debrid.clone().unwrap_or_default())
                .context("Failed to create AllDebrid client")?,
        ),
    };
    Ok(gateway)
}

/// Gateways for every provider with a configuration section.
fn configured_gateways(config: &Config) -> Result<Vec<Arc<dyn ProviderGateway>>> {
    let mut gateways = Vec::new();
    if config.real_debrid.is_some() {
        gateways.push(build_gateway(config, ProviderKind::RealDebrid)?);
    }
    if config.all_debrid.is_some() {
        gateways.push(build_gateway(config, ProviderKind::AllDebrid)?);
    }
    Ok(gateways)
}

/// Cache for one provider, primed from the remote library.
async fn loaded_cache(config: &Config, kind: ProviderKind) -> Result<DownloadsCache> {
    let cache = DownloadsCache::new(build_gateway(config, kind)?);
    cache
        .refresh()
        .await
        .with_context(|| format!("Failed to list {} library", kind))?;
    Ok(cache)
}

pub async fn scrape(config: &Config, request: ScrapeRequest) -> Result<()> {
    let sources = build_sources(config)?;
    if sources.is_empty() {
        bail!("No scraper sources configured");
    }
    let aggregator = Aggregator::from_config(sources, &config.scraper);
    let store = open_store(&config.database.path)?;

    let identity = request.identity.unwrap_or_default();
    let mut query = match request.season {
        Some(season) => MediaQuery::show(identity, &request.metadata, season, request.episodes),
        None => MediaQuery::movie(identity, &request.metadata),
    }
    .context("Invalid title")?;
    if query.identity.is_empty() {
        query.identity = query.media_id();
    }

    let (key, found) = match query.season {
        Some(season) => {
            let found = aggregator
                .scrape_show(&store, &query, request.replace_existing)
                .await?;
            (format!("tv:{}:{}", query.identity, season), found)
        }
        None => {
            let found = aggregator
                .scrape_movie(&store, &query, request.replace_existing)
                .await?;
            (format!("movie:{}", query.identity), found)
        }
    };

    let stored = store.get_results(&key)?.map(|r| r.len()).unwrap_or(0);
    print_json(&ScrapeReport { key, found, stored })
}

pub async fn check(
    config: &Config,
    key: Option<String>,
    hashes: Vec<String>,
    recheck: bool,
) -> Result<()> {
    let resolver = AvailabilityResolver::new(configured_gateways(config)?);
    if resolver.providers().is_empty() {
        bail!("No debrid providers configured");
    }

    let store = match &key {
        Some(_) => Some(open_store(&config.database.path)?),
        None => None,
    };
    let mut results = match (&store, &key) {
        (Some(store), Some(key)) => store
            .get_results(key)?
            .with_context(|| format!("No results stored under {}", key))?,
        _ => hashes
            .iter()
            .map(|h| {
                let hash = normalize_info_hash(h)
                    .with_context(|| format!("Invalid info hash: {}", h))?;
                Ok(SearchResult {
                    hash,
                    title: String::new(),
                    file_size: 0,
                    rd_available: false,
                    ad_available: false,
                    no_videos: false,
                })
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let providers = if recheck {
        let mut outcomes = Vec::new();
        for provider in resolver.providers() {
            outcomes.push((provider, resolver.recheck(provider, &mut results).await));
        }
        outcomes
    } else {
        resolver.check_providers(&mut results).await
    };

    if let (Some(store), Some(key)) = (&store, &key) {
        store.save_results(key, &results, true)?;
        info!(key = %key, "Saved availability flags");
    }

    let providers = providers
        .into_iter()
        .map(|(provider, outcome)| match outcome {
            Ok(available) => ProviderOutcome {
                provider,
                available: Some(available),
                error: None,
            },
            Err(e) => ProviderOutcome {
                provider,
                available: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    print_json(&CheckReport { providers, results })
}

pub async fn library(config: &Config, provider: &str) -> Result<()> {
    let kind: ProviderKind = provider.parse()?;
    let cache = loaded_cache(config, kind).await?;
    print_json(&cache.records().await)
}

pub async fn add(config: &Config, provider: &str, hash: &str, instant: bool) -> Result<()> {
    let kind: ProviderKind = provider.parse()?;
    let cache = loaded_cache(config, kind).await?;
    let record = cache.add(hash, instant).await?;
    print_json(&record)
}

pub async fn delete(config: &Config, provider_id: &str) -> Result<()> {
    let provider_id: ProviderId = provider_id.parse()?;
    let cache = loaded_cache(config, provider_id.kind()).await?;
    cache.delete(&provider_id).await?;
    info!(id = %provider_id, remaining = cache.len().await, "Torrent deleted");
    Ok(())
}

pub async fn downloads(config: &Config, delete: Option<String>) -> Result<()> {
    let client = RealDebridClient::new(config.real_debrid.clone().unwrap_or_default())
        .context("Failed to create Real-Debrid client")?;
    match delete {
        Some(id) => {
            client
                .delete_download(&id)
                .await
                .with_context(|| format!("Failed to delete download {}", id))?;
            info!(id = %id, "Download deleted");
            Ok(())
        }
        None => {
            let downloads = client
                .list_downloads()
                .await
                .context("Failed to list downloads")?;
            print_json(&downloads)
        }
    }
}
