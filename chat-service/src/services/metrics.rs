//! Prometheus metrics for chat-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter, TextEncoder,
};

/// Chat requests by outcome (ok, upstream_error, db_error).
pub static CHAT_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "chat_requests_total",
        "Total number of chat requests that reached the handler",
        &["status"]
    )
    .expect("Failed to register chat_requests_total")
});

/// History lookups by outcome (ok, not_found, db_error).
pub static HISTORY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "chat_history_requests_total",
        "Total number of history lookups that reached the handler",
        &["status"]
    )
    .expect("Failed to register chat_history_requests_total")
});

/// Generation latency by backend.
pub static GENERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "chat_generation_duration_seconds",
        "Text generation duration in seconds",
        &["backend"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to register generation_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "chat_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Conversation turns written.
pub static TURNS_PERSISTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chat_turns_persisted_total",
        "Total number of conversation turns persisted"
    )
    .expect("Failed to register turns_persisted_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&CHAT_REQUESTS_TOTAL);
    Lazy::force(&HISTORY_REQUESTS_TOTAL);
    Lazy::force(&GENERATION_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&TURNS_PERSISTED_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_exported_after_init() {
        init_metrics();
        CHAT_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();

        let output = get_metrics();
        assert!(output.contains("chat_requests_total"));
    }
}
