//! Prometheus metrics for schele-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "schele_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Work report lifecycle events.
pub static WORK_REPORTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "schele_work_reports_total",
        "Total number of work report lifecycle events",
        &["event"] // created, billed, deleted
    )
    .expect("Failed to register work_reports_total")
});

/// Proforma creation attempts by outcome.
pub static PROFORMAS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "schele_proformas_total",
        "Total number of proforma creation attempts",
        &["outcome"] // created, rejected
    )
    .expect("Failed to register proformas_total")
});

/// Lines valued at zero because no price resolved.
pub static UNPRICED_ITEMS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "schele_unpriced_items_total",
        "Work report lines valued without an applicable price",
        &["view"]
    )
    .expect("Failed to register unpriced_items_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "schele_errors_total",
        "Total number of errors by kind",
        &["kind"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&WORK_REPORTS_TOTAL);
    Lazy::force(&PROFORMAS_TOTAL);
    Lazy::force(&UNPRICED_ITEMS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
}

/// Count a failed operation under its error kind.
pub fn record_error(err: &service_core::error::AppError) {
    ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
}

/// Count lines valued at zero in a view, if any.
pub fn record_unpriced(view: &str, lines: usize) {
    if lines > 0 {
        UNPRICED_ITEMS_TOTAL
            .with_label_values(&[view])
            .inc_by(lines as f64);
    }
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
