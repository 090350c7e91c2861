//! # Metrics
//!
//! Prometheus metrics for monitoring the gateway.
//!
//! ## Metrics Exposed
//!
//! - `vault_gateway_kv_operations_total` - KV operations by operation and outcome
//! - `vault_gateway_kv_operation_duration_seconds` - Duration of KV operations by operation
//! - `vault_gateway_token_renewals_total` - Session token renewals (ahead-of-expiry and timer-driven)
//! - `vault_gateway_auth_retries_total` - Re-authentication retries triggered by a rejected token

use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static KV_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vault_gateway_kv_operations_total",
            "Total number of KV operations by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create KV_OPERATIONS_TOTAL metric - this should never happen")
});

static KV_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "vault_gateway_kv_operation_duration_seconds",
            "Duration of KV operations in seconds by operation",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create KV_OPERATION_DURATION metric - this should never happen")
});

static TOKEN_RENEWALS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_gateway_token_renewals_total",
        "Total number of session token renewals",
    )
    .expect("Failed to create TOKEN_RENEWALS_TOTAL metric - this should never happen")
});

static AUTH_RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_gateway_auth_retries_total",
        "Total number of re-authentication retries after a rejected token",
    )
    .expect("Failed to create AUTH_RETRIES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(KV_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(KV_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(TOKEN_RENEWALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUTH_RETRIES_TOTAL.clone()))?;

    Ok(())
}

pub fn record_kv_operation(operation: &str, outcome: &str, duration: f64) {
    KV_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    KV_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_token_renewals() {
    TOKEN_RENEWALS_TOTAL.inc();
}

pub fn increment_auth_retries() {
    AUTH_RETRIES_TOTAL.inc();
}
