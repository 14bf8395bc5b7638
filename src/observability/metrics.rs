//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `secret_sync_passes_total` - Total number of reconciliation passes
//! - `secret_sync_pass_errors_total` - Failed passes, labeled by error kind
//! - `secret_sync_pass_duration_seconds` - Duration of successful passes
//! - `secret_sync_commits_total` - Output secrets written
//! - `secret_sync_skips_total` - Passes skipped via fingerprint match
//! - `secret_sync_provider_fetches_total` - Provider fetch calls issued

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static PASSES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_sync_passes_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create PASSES_TOTAL metric - this should never happen")
});

static PASS_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_sync_pass_errors_total",
            "Total number of failed reconciliation passes by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create PASS_ERRORS_TOTAL metric - this should never happen")
});

static PASS_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "secret_sync_pass_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create PASS_DURATION metric - this should never happen")
});

static COMMITS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_sync_commits_total",
        "Total number of output secrets written",
    )
    .expect("Failed to create COMMITS_TOTAL metric - this should never happen")
});

static SKIPS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_sync_skips_total",
        "Total number of passes skipped because content was unchanged",
    )
    .expect("Failed to create SKIPS_TOTAL metric - this should never happen")
});

static PROVIDER_FETCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_sync_provider_fetches_total",
        "Total number of provider fetch calls issued",
    )
    .expect("Failed to create PROVIDER_FETCHES_TOTAL metric - this should never happen")
});

/// Register all metrics with the controller registry.
/// Called once during bootstrap, before the HTTP server starts serving.
///
/// # Errors
///
/// Fails when a metric is registered twice (a bootstrap bug).
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(PASSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_DURATION.clone()))?;
    REGISTRY.register(Box::new(COMMITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SKIPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_FETCHES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_passes() {
    PASSES_TOTAL.inc();
}

pub fn increment_pass_errors(kind: &str) {
    PASS_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_pass_duration(seconds: f64) {
    PASS_DURATION.observe(seconds);
}

pub fn increment_commits() {
    COMMITS_TOTAL.inc();
}

pub fn increment_skips() {
    SKIPS_TOTAL.inc();
}

pub fn increment_provider_fetches() {
    PROVIDER_FETCHES_TOTAL.inc();
}
