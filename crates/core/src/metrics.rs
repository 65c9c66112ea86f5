//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Searches (attempts, results, duration)
//! - Sessions (logins, mid-search recoveries)
//! - Downloads (payload resolution by kind)
//! - Parsing (dropped rows)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Search Metrics
// =============================================================================

/// Searches total by indexer and result.
pub static SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trawler_searches_total", "Total searches dispatched"),
        &["indexer", "result"], // "ok", "empty", "error"
    )
    .unwrap()
});

/// Search duration in seconds, per indexer.
pub static SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "trawler_search_duration_seconds",
            "Duration of one site search, login included",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["indexer"],
    )
    .unwrap()
});

/// Search results returned per query.
pub static SEARCH_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "trawler_search_results",
            "Number of releases returned per search",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Session Metrics
// =============================================================================

/// Login attempts by indexer and result.
pub static LOGINS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trawler_logins_total", "Total login attempts"),
        &["indexer", "result"], // "ok", "captcha", "failed"
    )
    .unwrap()
});

/// Sessions re-established mid-search after the site rejected the cookies.
pub static SESSION_RECOVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trawler_session_recoveries_total",
            "Logins forced by an expired session during a search or download",
        ),
        &["indexer"],
    )
    .unwrap()
});

// =============================================================================
// Download Metrics
// =============================================================================

/// Download payloads resolved by indexer and kind.
pub static DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trawler_downloads_total",
            "Download payloads resolved successfully",
        ),
        &["indexer", "kind"], // "torrent", "magnet"
    )
    .unwrap()
});

// =============================================================================
// Parse Metrics
// =============================================================================

/// Rows discarded during parsing for missing mandatory fields.
pub static ROWS_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trawler_rows_dropped_total",
            "Result rows dropped for lacking a title or any link",
        ),
        &["indexer"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Search
        Box::new(SEARCHES.clone()),
        Box::new(SEARCH_DURATION.clone()),
        Box::new(SEARCH_RESULTS.clone()),
        // Session
        Box::new(LOGINS.clone()),
        Box::new(SESSION_RECOVERIES.clone()),
        // Download
        Box::new(DOWNLOADS.clone()),
        // Parse
        Box::new(ROWS_DROPPED.clone()),
    ]
}
