//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Allocation (basket searches, ledger conflicts, replacements)
//! - Fulfillment runs (terminal statuses, durations)
//! - Activation channel (per-code outcomes, lockouts, latency)
//! - Audit pipeline (events lost to a full channel or failed writes)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Allocation Metrics
// =============================================================================

/// Basket allocation attempts by result.
pub static ALLOCATION_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "redeemer_allocation_attempts_total",
            "Total basket allocation attempts",
        ),
        &["result"], // "reserved", "no_match", "conflict"
    )
    .unwrap()
});

/// Basket size (number of codes) at reservation time.
pub static BASKET_SIZE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("redeemer_basket_size", "Number of codes per reserved basket")
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 20.0]),
        &[],
    )
    .unwrap()
});

/// Replacement lookups for dead codes by result.
pub static REPLACEMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "redeemer_replacements_total",
            "Replacement code lookups for dead codes",
        ),
        &["result"], // "found", "none"
    )
    .unwrap()
});

// =============================================================================
// Fulfillment Metrics
// =============================================================================

/// Orders reaching a terminal status.
pub static ORDERS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "redeemer_orders_finished_total",
            "Orders written with a terminal status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Fulfillment run duration in seconds.
pub static FULFILLMENT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "redeemer_fulfillment_duration_seconds",
            "Duration of fulfillment runs",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        &["status"],
    )
    .unwrap()
});

/// Runs stopped because every worker locked out.
pub static POOL_EXHAUSTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "redeemer_worker_pool_exhaustions_total",
        "Fulfillment runs stopped by worker pool exhaustion",
    )
    .unwrap()
});

// =============================================================================
// Activation Metrics
// =============================================================================

/// Activation attempts by classified outcome.
pub static ACTIVATION_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "redeemer_activation_outcomes_total",
            "Activation driver calls by classified outcome",
        ),
        &["outcome"], // "activated", "lockout", "already_redeemed", "redemption_error"
    )
    .unwrap()
});

/// Activation call duration in seconds.
pub static ACTIVATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "redeemer_activation_duration_seconds",
            "Duration of activation driver calls",
        )
        .buckets(vec![1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Worker lockouts observed during runs.
pub static WORKER_LOCKOUTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "redeemer_worker_lockouts_total",
        "Workers disabled for the rest of a run after a lockout",
    )
    .unwrap()
});

// =============================================================================
// Audit Metrics
// =============================================================================

/// Audit events that never reached the store, by stage.
pub static AUDIT_EVENTS_LOST: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "redeemer_audit_events_lost_total",
            "Audit events dropped before being persisted",
        ),
        &["stage"], // channel_full, channel_closed, write_failed
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Allocation
        Box::new(ALLOCATION_ATTEMPTS.clone()),
        Box::new(BASKET_SIZE.clone()),
        Box::new(REPLACEMENTS.clone()),
        // Fulfillment
        Box::new(ORDERS_FINISHED.clone()),
        Box::new(FULFILLMENT_DURATION.clone()),
        Box::new(POOL_EXHAUSTIONS.clone()),
        // Activation
        Box::new(ACTIVATION_OUTCOMES.clone()),
        Box::new(ACTIVATION_DURATION.clone()),
        Box::new(WORKER_LOCKOUTS.clone()),
        // Audit
        Box::new(AUDIT_EVENTS_LOST.clone()),
    ]
}
