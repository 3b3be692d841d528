//! Metrics module for billing-service.
//! Provides Prometheus metrics for billing operations and per-organization metering.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Subscription lifecycle operations
pub static SUBSCRIPTION_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Usage counter adjustments
pub static USAGE_UPDATES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Invoices created
pub static INVOICES_CREATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Payments recorded, by resulting status
pub static PAYMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Membership operations
pub static MEMBERSHIP_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    SUBSCRIPTION_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_subscription_operations_total",
                "Total subscription operations by operation type"
            ),
            &["operation"]
        )
        .expect("Failed to register SUBSCRIPTION_OPERATIONS_TOTAL")
    });

    USAGE_UPDATES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("billing_usage_updates_total", "Total usage counter updates"),
            &["field", "mode"]
        )
        .expect("Failed to register USAGE_UPDATES_TOTAL")
    });

    INVOICES_CREATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("billing_invoices_created_total", "Total invoices created"),
            &["currency", "source"]
        )
        .expect("Failed to register INVOICES_CREATED_TOTAL")
    });

    PAYMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("billing_payments_total", "Total payments by status"),
            &["status"]
        )
        .expect("Failed to register PAYMENTS_TOTAL")
    });

    MEMBERSHIP_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_membership_operations_total",
                "Total organization membership operations"
            ),
            &["operation"]
        )
        .expect("Failed to register MEMBERSHIP_OPERATIONS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("billing_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_subscription_operation(operation: &str) {
    if let Some(counter) = SUBSCRIPTION_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

pub fn record_usage_update(field: &str, mode: &str) {
    if let Some(counter) = USAGE_UPDATES_TOTAL.get() {
        counter.with_label_values(&[field, mode]).inc();
    }
}

pub fn record_invoice_created(currency: &str, source: &str) {
    if let Some(counter) = INVOICES_CREATED_TOTAL.get() {
        counter.with_label_values(&[currency, source]).inc();
    }
}

pub fn record_payment(status: &str) {
    if let Some(counter) = PAYMENTS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

pub fn record_membership_operation(operation: &str) {
    if let Some(counter) = MEMBERSHIP_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
