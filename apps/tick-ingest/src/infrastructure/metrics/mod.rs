//! Service Metrics
//!
//! Metric names and recording helpers, emitted through the `metrics`
//! facade. Exposition (the Prometheus endpoint) belongs to the external
//! probe subsystem; this service only records.
//!
//! # Metrics Categories
//!
//! - **Records**: received, rejected (per reason), published, lost
//! - **Connections**: active gauge and accepted counter
//! - **Publish**: retry counter and per-record delivery timing

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register descriptions for every metric this service emits.
///
/// Idempotent; call once at startup.
pub fn register_metrics() {
    describe_counter!(
        "tick_ingest_records_received_total",
        "Raw records extracted from inbound connections"
    );
    describe_counter!(
        "tick_ingest_records_rejected_total",
        "Records rejected by validation, labeled per reason"
    );
    describe_counter!(
        "tick_ingest_records_published_total",
        "Enriched records delivered to the tick log"
    );
    describe_counter!(
        "tick_ingest_publish_failures_total",
        "Records lost after the publish retry budget"
    );
    describe_counter!(
        "tick_ingest_publish_retries_total",
        "Publish delivery attempts beyond the first"
    );

    describe_gauge!(
        "tick_ingest_active_connections",
        "Currently open inbound connections"
    );
    describe_counter!(
        "tick_ingest_connections_total",
        "Inbound connections accepted since startup"
    );
    describe_counter!(
        "tick_ingest_connection_cap_exceeded_total",
        "Connections admitted above the soft cap"
    );

    describe_histogram!(
        "tick_ingest_record_latency_ms",
        "Receipt-minus-event latency of accepted records"
    );
    describe_histogram!(
        "tick_ingest_publish_duration_seconds",
        "Time from publish call to delivery acknowledgment"
    );
}

/// Record one raw record received.
pub fn record_received() {
    counter!("tick_ingest_records_received_total").increment(1);
}

/// Record one rejection under its reason label.
pub fn record_rejection(reason: &'static str) {
    counter!("tick_ingest_records_rejected_total", "reason" => reason).increment(1);
}

/// Record one successful publish.
pub fn record_published() {
    counter!("tick_ingest_records_published_total").increment(1);
}

/// Record one record lost after retry exhaustion.
pub fn record_publish_failure() {
    counter!("tick_ingest_publish_failures_total").increment(1);
}

/// Record one publish retry attempt.
pub fn record_publish_retry() {
    counter!("tick_ingest_publish_retries_total").increment(1);
}

/// Update the active connection gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_connections(count: usize) {
    gauge!("tick_ingest_active_connections").set(count as f64);
}

/// Record one accepted connection.
pub fn record_connection_accepted() {
    counter!("tick_ingest_connections_total").increment(1);
}

/// Record one connection admitted above the soft cap.
pub fn record_connection_cap_exceeded() {
    counter!("tick_ingest_connection_cap_exceeded_total").increment(1);
}

/// Record the receipt-minus-event latency of an accepted record.
#[allow(clippy::cast_precision_loss)]
pub fn record_latency(latency_ms: i64) {
    histogram!("tick_ingest_record_latency_ms").record(latency_ms as f64);
}

/// Record how long one publish call took end to end.
pub fn record_publish_duration(duration: Duration) {
    histogram!("tick_ingest_publish_duration_seconds").record(duration.as_secs_f64());
}
