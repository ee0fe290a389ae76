use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Scraper concurrency is not 0
/// - Title similarity threshold is in (0, 1]
/// - Configured sources and providers have a URL and a non-zero timeout
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let scraper = &config.scraper;

    if scraper.max_concurrent_queries == 0 {
        return Err(ConfigError::ValidationError(
            "scraper.max_concurrent_queries cannot be 0".to_string(),
        ));
    }

    if !(scraper.min_title_similarity > 0.0 && scraper.min_title_similarity <= 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "scraper.min_title_similarity must be in (0, 1], got {}",
            scraper.min_title_similarity
        )));
    }

    if let Some(jackett) = &scraper.jackett {
        check_endpoint("scraper.jackett", &jackett.url, jackett.timeout_secs)?;
    }
    if let Some(prowlarr) = &scraper.prowlarr {
        check_endpoint("scraper.prowlarr", &prowlarr.url, prowlarr.timeout_secs)?;
    }
    if let Some(rd) = &config.real_debrid {
        check_endpoint("real_debrid", &rd.base_url, rd.timeout_secs)?;
    }
    if let Some(ad) = &config.all_debrid {
        check_endpoint("all_debrid", &ad.base_url, ad.timeout_secs)?;
    }

    Ok(())
}

fn check_endpoint(section: &str, url: &str, timeout_secs: u32) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{}: url cannot be empty",
            section
        )));
    }
    if timeout_secs == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{}: timeout_secs cannot be 0",
            section
        )));
    }
    Ok(())
}
