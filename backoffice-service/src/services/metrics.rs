//! Prometheus metrics for backoffice-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

/// Workflow operation counter by operation and outcome.
pub static WORKFLOW_OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_workflow_operations_total",
        "Total number of workflow operations by outcome",
        &["operation", "outcome"] // ok, bad_request, not_found, unauthorized, conflict, internal
    )
    .expect("Failed to register workflow_operations_total")
});

/// Stock movements by activity action.
pub static STOCK_MUTATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_stock_mutations_total",
        "Total number of stock quantity changes by action",
        &["action"]
    )
    .expect("Failed to register stock_mutations_total")
});

/// Reservations refused by the atomic stock guard.
pub static STOCK_CONFLICTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "backoffice_stock_conflicts_total",
        "Total number of stock reservations refused at commit time"
    )
    .expect("Failed to register stock_conflicts_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "backoffice_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Invoiced amount by status at creation.
pub static INVOICE_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_invoice_amount_total",
        "Total invoiced amount by status",
        &["status"]
    )
    .expect("Failed to register invoice_amount_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&WORKFLOW_OPERATIONS_TOTAL);
    Lazy::force(&STOCK_MUTATIONS_TOTAL);
    Lazy::force(&STOCK_CONFLICTS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INVOICE_AMOUNT_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

/// Count a finished workflow operation.
pub fn record_outcome<T>(operation: &str, result: &Result<T, crate::error::WorkflowError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    WORKFLOW_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exported_text_contains_backoffice_metrics() {
        init_metrics();
        STOCK_CONFLICTS_TOTAL.inc();
        let text = get_metrics();
        assert!(text.contains("backoffice_stock_conflicts_total"));
    }
}
