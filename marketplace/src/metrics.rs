//! Business metrics for the marketplace.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `surplus_reservations_total{outcome}` - Reserve attempts by outcome
//! - `surplus_ledger_conflicts_total{operation}` - Version conflicts seen by the ledger
//! - `surplus_walk_in_units_total` - Units sold in person
//! - `surplus_feed_requests_total` - Feed requests served
//! - `surplus_pickups_completed_total{mode}` - Pickups confirmed by sellers or the sweep
//!
//! ## Histograms
//! - `surplus_ledger_duration_seconds{operation}` - Ledger operation latency

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "surplus_reservations_total",
        "Reserve attempts by outcome (reserved, insufficient_stock, rejected, failed)"
    );
    describe_counter!(
        "surplus_ledger_conflicts_total",
        "Optimistic concurrency conflicts hit by ledger operations"
    );
    describe_counter!(
        "surplus_walk_in_units_total",
        "Units sold in person through walk-in sales"
    );
    describe_counter!(
        "surplus_feed_requests_total",
        "Buyer feed requests served"
    );
    describe_counter!(
        "surplus_pickups_completed_total",
        "Pickups completed, by seller confirmation or the overdue sweep"
    );
    describe_histogram!(
        "surplus_ledger_duration_seconds",
        "Time taken by a ledger operation including its retry"
    );

    tracing::info!("Business metrics registered");
}

/// Install the Prometheus recorder and return the handle that renders `/metrics`.
///
/// # Errors
///
/// Returns an error if the bucket configuration is rejected or a recorder is
/// already installed.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
        )?
        .install_recorder()?;
    register_business_metrics();
    Ok(handle)
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record the outcome of a reserve attempt.
///
/// # Arguments
///
/// * `outcome` - `reserved`, `insufficient_stock`, `rejected` or `failed`
pub fn record_reservation(outcome: &'static str) {
    metrics::counter!("surplus_reservations_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded reservation metric");
}

/// Record a version conflict on `operation`.
pub fn record_conflict(operation: &'static str) {
    metrics::counter!("surplus_ledger_conflicts_total", "operation" => operation).increment(1);
    tracing::debug!(operation, "Recorded ledger_conflict metric");
}

/// Record units sold in person.
pub fn record_walk_in(quantity: u32) {
    metrics::counter!("surplus_walk_in_units_total").increment(u64::from(quantity));
    tracing::debug!(quantity, "Recorded walk_in metric");
}

/// Record a feed request.
pub fn record_feed_request() {
    metrics::counter!("surplus_feed_requests_total").increment(1);
}

/// Record a completed pickup.
///
/// # Arguments
///
/// * `automatic` - completed by the overdue sweep rather than the seller
pub fn record_pickup_completed(automatic: bool) {
    let mode = if automatic { "automatic" } else { "seller" };
    metrics::counter!("surplus_pickups_completed_total", "mode" => mode).increment(1);
    tracing::debug!(mode, "Recorded pickup_completed metric");
}

/// Record the latency of a ledger operation.
pub fn record_ledger_duration(operation: &'static str, elapsed: Duration) {
    metrics::histogram!("surplus_ledger_duration_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}
