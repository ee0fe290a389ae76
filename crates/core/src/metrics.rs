//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scraping (source queries, scrape duration, result counts)
//! - Availability checks (batch attempts per provider)
//! - Lifecycle actions (add, select, delete, refresh per provider)

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Registry holding every core collector.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for collector in all_metrics() {
        // Only fails on duplicate registration, which cannot happen here
        let _ = registry.register(collector);
    }
    registry
});

// =============================================================================
// Scraping
// =============================================================================

/// Source adapter queries by source and result.
pub static SOURCE_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dmm_source_queries_total", "Total source adapter queries"),
        &["source", "result"], // "success", "failed"
    )
    .unwrap()
});

/// Scrape duration in seconds.
pub static SCRAPE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("dmm_scrape_duration_seconds", "Duration of a full scrape")
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["media_type"],
    )
    .unwrap()
});

/// Results kept per scrape, after dedup and filtering.
pub static SCRAPE_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("dmm_scrape_results", "Number of results kept per scrape")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &["media_type"],
    )
    .unwrap()
});

// =============================================================================
// Providers
// =============================================================================

/// Instant-availability batch attempts.
pub static AVAILABILITY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dmm_availability_attempts_total",
            "Total instant-availability batch attempts",
        ),
        &["provider", "result"], // "success", "transient", "failed"
    )
    .unwrap()
});

/// Lifecycle actions against provider gateways.
pub static LIFECYCLE_ACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dmm_lifecycle_actions_total", "Total lifecycle actions"),
        &["provider", "action", "result"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SOURCE_QUERIES.clone()),
        Box::new(SCRAPE_DURATION.clone()),
        Box::new(SCRAPE_RESULTS.clone()),
        Box::new(AVAILABILITY_ATTEMPTS.clone()),
        Box::new(LIFECYCLE_ACTIONS.clone()),
    ]
}

/// Encode all core metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
