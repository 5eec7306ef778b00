//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the redeemer server:
//! - HTTP request metrics (latency, counts, auth failures)
//! - Order and stock gauges (collected on scrape)
//! - Fulfillment metrics re-registered from core

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use regex_lite::Regex;

use redeemer_core::{CodeState, OrderFilter, OrderStatus};

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
            "redeemer_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0, 300.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("redeemer_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "redeemer_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "redeemer_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Order and Stock Metrics (collected dynamically)
// =============================================================================

/// Orders by current status.
pub static ORDERS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("redeemer_orders_by_status", "Current order count by status"),
        &["status"],
    )
    .unwrap()
});

/// Orders created total.
pub static ORDERS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "redeemer_orders_created_total",
        "Total orders created since startup",
    )
    .unwrap()
});

/// Codes by ledger state.
pub static CODES_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("redeemer_codes_by_state", "Current code count by ledger state"),
        &["state"],
    )
    .unwrap()
});

/// Sum of face values of free codes.
pub static FREE_STOCK_VALUE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "redeemer_free_stock_value",
        "Total face value of free codes",
    )
    .unwrap()
});

/// Background fulfillment loop state (1 = running, 0 = stopped).
pub static FULFILLMENT_LOOP_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "redeemer_fulfillment_loop_running",
        "Whether the auto-fulfillment loop is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Register all metrics with the registry.
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
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Orders and stock
    registry
        .register(Box::new(ORDERS_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(ORDERS_CREATED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(CODES_BY_STATE.clone()))
        .unwrap();
    registry
        .register(Box::new(FREE_STOCK_VALUE.clone()))
        .unwrap();
    registry
        .register(Box::new(FULFILLMENT_LOOP_RUNNING.clone()))
        .unwrap();

    // Core metrics (allocation, activation, fulfillment)
    for metric in redeemer_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the stores at scrape time.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    FULFILLMENT_LOOP_RUNNING.set(
        state
            .orchestrator()
            .map(|o| i64::from(o.is_running()))
            .unwrap_or(0),
    );

    for status in [
        OrderStatus::Pending,
        OrderStatus::Completed,
        OrderStatus::Partial,
        OrderStatus::Cancelled,
        OrderStatus::Error,
    ] {
        if let Ok(count) = state
            .order_store()
            .count(&OrderFilter::new().with_status(status))
        {
            ORDERS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }

    if let Ok(summary) = state.ledger().summary() {
        for (code_state, count) in [
            (CodeState::Free, summary.free),
            (CodeState::Reserved, summary.reserved),
            (CodeState::Activated, summary.activated),
            (CodeState::Broken, summary.broken),
        ] {
            CODES_BY_STATE
                .with_label_values(&[code_state.as_str()])
                .set(count as i64);
        }
        FREE_STOCK_VALUE.set(summary.free_value() as i64);
    }
}

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_SEGMENT.replace_all(path, "{id}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}
