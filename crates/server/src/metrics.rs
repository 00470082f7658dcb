//! Prometheus metrics for the mapvault server.
//!
//! Exposes counters for tile serving, upstream fetches, content deduplication,
//! and archive imports.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! It exposes aggregate usage only (no tileset ids or URLs), but should still be
//! network-restricted to the scraper at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Tile serving metrics
pub static TILE_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mapvault_tile_requests_total",
            "Tile requests by outcome (hit, miss_fetched, not_found)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static TILE_BYTES_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mapvault_tile_bytes_served_total",
        "Total tile payload bytes returned to clients",
    )
    .expect("metric creation failed")
});

// Upstream metrics
pub static UPSTREAM_FETCHES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mapvault_upstream_fetches_total",
            "Upstream fetches by result (ok, not_modified, offline, rejected)",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

pub static UPSTREAM_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "mapvault_upstream_fetch_duration_seconds",
            "Time taken to fetch one tile from an upstream origin",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

pub static REVALIDATIONS_COALESCED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mapvault_revalidations_coalesced_total",
        "Background revalidations skipped because one was already in flight",
    )
    .expect("metric creation failed")
});

// Content store metrics
pub static TILE_DATA_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mapvault_tile_data_deduplicated_total",
        "Tile writes whose bytes were already stored",
    )
    .expect("metric creation failed")
});

pub static TILE_DATA_RECLAIMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mapvault_tile_data_reclaimed_total",
        "Unreferenced tile data rows removed",
    )
    .expect("metric creation failed")
});

// Import metrics
pub static IMPORTS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("mapvault_imports_active", "Current number of running imports")
        .expect("metric creation failed")
});

pub static IMPORTS_FINISHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mapvault_imports_finished_total",
            "Imports by terminal outcome (complete, timeout, unknown)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static IMPORTS_PANICKED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mapvault_imports_panicked_total",
        "Import tasks that panicked and were failed by the watchdog",
    )
    .expect("metric creation failed")
});

pub static IMPORT_TILES_WRITTEN: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mapvault_import_tiles_written_total",
        "Tiles written by archive imports",
    )
    .expect("metric creation failed")
});

pub static IMPORT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "mapvault_import_duration_seconds",
            "Wall time of finished imports",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once; later calls are no-ops.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(TILE_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TILE_BYTES_SERVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPSTREAM_FETCHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPSTREAM_FETCH_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REVALIDATIONS_COALESCED.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(TILE_DATA_DEDUPLICATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TILE_DATA_RECLAIMED.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(IMPORTS_ACTIVE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMPORTS_FINISHED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMPORTS_PANICKED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMPORT_TILES_WRITTEN.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMPORT_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record the outcome of a tile request.
pub fn record_tile_request(outcome: &str) {
    TILE_REQUESTS.with_label_values(&[outcome]).inc();
}

/// Record the result of an upstream fetch.
pub fn record_upstream_fetch(result: &str) {
    UPSTREAM_FETCHES.with_label_values(&[result]).inc();
}
