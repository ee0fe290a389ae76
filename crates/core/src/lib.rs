pub mod config;
pub mod debrid;
pub mod media;
pub mod metrics;
pub mod scraper;
pub mod store;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, AllDebridConfig, Config, ConfigError,
    DatabaseConfig, JackettConfig, ProwlarrConfig, RealDebridConfig, SanitizedConfig,
    ScraperConfig,
};
pub use debrid::{
    AllDebridClient, AvailabilityError, AvailabilityResolver, DebridError, DownloadStatus,
    DownloadsCache, LifecycleError, ProviderDownloadRecord, ProviderGateway, ProviderId,
    ProviderKind, RealDebridClient, RealDebridDownload, SelectionOutcome,
};
pub use media::{
    get_media_id, title_variants, MediaError, MediaInfo, MediaQuery, MediaType, TitleMetadata,
};
pub use scraper::{
    Aggregator, JackettSource, ProwlarrSource, RawResult, ScrapeError, SearchResult,
    SourceAdapter, TitleMatcher,
};
pub use store::{ProcessingStore, SqliteProcessingStore, StoreError};
