//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Librarr server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Download and library gauges (collected dynamically)
//! - Everything registered by the core crate

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::warn;

use librarr_core::DownloadStatus;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "librarr_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("librarr_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "librarr_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Download Metrics (collected dynamically)
// =============================================================================

/// Downloads by current status.
pub static DOWNLOADS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("librarr_downloads_by_status", "Current download count by status"),
        &["status"],
    )
    .unwrap()
});

/// Configured indexers.
pub static INDEXERS_CONFIGURED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("librarr_indexers_configured", "Number of enabled indexers").unwrap()
});

/// Configured download clients.
pub static DOWNLOAD_CLIENTS_CONFIGURED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "librarr_download_clients_configured",
        "Number of enabled download clients",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Downloads
    registry
        .register(Box::new(DOWNLOADS_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(INDEXERS_CONFIGURED.clone()))
        .unwrap();
    registry
        .register(Box::new(DOWNLOAD_CLIENTS_CONFIGURED.clone()))
        .unwrap();

    // Core metrics (indexers, acquisition, import)
    for metric in librarr_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the store's current contents.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let acquirer = state.acquirer();
    INDEXERS_CONFIGURED.set(acquirer.indexers().indexer_names().len() as i64);
    DOWNLOAD_CLIENTS_CONFIGURED.set(acquirer.clients().len() as i64);

    for status in [
        DownloadStatus::Queued,
        DownloadStatus::Downloading,
        DownloadStatus::Completed,
        DownloadStatus::Importing,
        DownloadStatus::Downloaded,
        DownloadStatus::Failed,
    ] {
        if let Ok(downloads) = acquirer.list_downloads(Some(status)) {
            DOWNLOADS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(downloads.len() as i64);
        }
    }
}

static UUID_RE: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});
static HASH_RE: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"[0-9a-fA-F]{40}").unwrap());
static NUMERIC_RE: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = HASH_RE.replace_all(&result, "{hash}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}
