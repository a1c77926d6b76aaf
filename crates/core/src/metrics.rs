//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Indexer fan-out (per-indexer outcomes, search latency, result counts)
//! - Acquisition (outcomes, dispatches per client)
//! - Import pipeline (imports, bytes placed, conversions)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Indexer Metrics
// =============================================================================

/// Per-indexer search calls by result.
pub static INDEXER_SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "librarr_indexer_searches_total",
            "Total searches issued to each indexer",
        ),
        &["indexer", "result"], // result: "success", "error", "timeout"
    )
    .unwrap()
});

/// Fan-out search duration in seconds.
pub static SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "librarr_search_duration_seconds",
            "Duration of a fan-out search across all indexers",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &[],
    )
    .unwrap()
});

/// Search results returned per fan-out search.
pub static SEARCH_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "librarr_search_results",
            "Number of search results returned per query",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Acquisition Metrics
// =============================================================================

/// Acquisition attempts total by result.
pub static ACQUISITION_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "librarr_acquisition_attempts_total",
            "Total acquisition attempts",
        ),
        &["result"], // "dispatched", "not_found", "failed"
    )
    .unwrap()
});

/// Downloads handed to a client, by client and result.
pub static DOWNLOADS_DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "librarr_downloads_dispatched_total",
            "Total download dispatch attempts",
        ),
        &["client", "result"],
    )
    .unwrap()
});

/// Downloads marked failed.
pub static DOWNLOADS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "librarr_downloads_failed_total",
        "Total downloads reported as failed",
    )
    .unwrap()
});

// =============================================================================
// Import Metrics
// =============================================================================

/// Imports by media type and result.
pub static IMPORTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("librarr_imports_total", "Total import attempts"),
        &["media_type", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// Bytes placed into the library.
pub static IMPORTED_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "librarr_imported_bytes_total",
        "Total bytes placed into the library",
    )
    .unwrap()
});

/// External tool runs by tool and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "librarr_conversions_total",
            "Total external conversion tool runs",
        ),
        &["tool", "result"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Indexers
        Box::new(INDEXER_SEARCHES.clone()),
        Box::new(SEARCH_DURATION.clone()),
        Box::new(SEARCH_RESULTS.clone()),
        // Acquisition
        Box::new(ACQUISITION_ATTEMPTS.clone()),
        Box::new(DOWNLOADS_DISPATCHED.clone()),
        Box::new(DOWNLOADS_FAILED.clone()),
        // Import
        Box::new(IMPORTS_TOTAL.clone()),
        Box::new(IMPORTED_BYTES.clone()),
        Box::new(CONVERSIONS_TOTAL.clone()),
    ]
}
