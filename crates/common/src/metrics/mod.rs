//! Metrics and observability utilities
//!
//! Prometheus metrics for reasoning turns, graph queries and
//! collaborator degradation.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram,
    gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all PoliKG metrics
pub const METRICS_PREFIX: &str = "polikg";

/// Buckets for graph query latency (in seconds)
pub const GRAPH_QUERY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s - default store deadline
];

/// Buckets for hops per turn
pub const HOP_BUCKETS: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Turn metrics
    describe_counter!(
        format!("{}_turns_total", METRICS_PREFIX),
        Unit::Count,
        "Total reasoning turns by pattern"
    );

    describe_histogram!(
        format!("{}_turn_hops", METRICS_PREFIX),
        Unit::Count,
        "Hops executed per reasoning turn"
    );

    describe_histogram!(
        format!("{}_turn_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Reasoning turn latency in seconds"
    );

    // Graph store metrics
    describe_histogram!(
        format!("{}_graph_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Graph query latency in seconds"
    );

    describe_counter!(
        format!("{}_graph_query_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Graph queries that failed or timed out"
    );

    describe_gauge!(
        format!("{}_graph_rows_returned", METRICS_PREFIX),
        Unit::Count,
        "Rows returned by the last graph query"
    );

    // Collaborator metrics
    describe_counter!(
        format!("{}_collaborator_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Collaborator calls that degraded to the default"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a finished reasoning turn
pub fn record_turn(pattern: &str, hops: usize, duration_secs: f64) {
    counter!(
        format!("{}_turns_total", METRICS_PREFIX),
        "pattern" => pattern.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_turn_hops", METRICS_PREFIX),
        "pattern" => pattern.to_string()
    )
    .record(hops as f64);

    histogram!(
        format!("{}_turn_duration_seconds", METRICS_PREFIX),
        "pattern" => pattern.to_string()
    )
    .record(duration_secs);
}

/// Record a successful graph query
pub fn record_graph_query(duration_secs: f64, step: &str, rows: usize) {
    histogram!(
        format!("{}_graph_query_duration_seconds", METRICS_PREFIX),
        "step" => step.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_graph_rows_returned", METRICS_PREFIX),
        "step" => step.to_string()
    )
    .set(rows as f64);
}

/// Record a failed graph query; `kind` is `error` or `timeout`
pub fn record_graph_failure(kind: &str) {
    counter!(
        format!("{}_graph_query_failures_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a collaborator degrading to its default
pub fn record_collaborator_fallback(collaborator: &str) {
    counter!(
        format!("{}_collaborator_fallbacks_total", METRICS_PREFIX),
        "collaborator" => collaborator.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [GRAPH_QUERY_BUCKETS, HOP_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
        // Store deadline should be a bucket edge
        assert!(GRAPH_QUERY_BUCKETS.contains(&5.0));
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("POST", "/v1/turns");
        metrics.finish(200);
        record_turn("simple", 3, 0.2);
        record_graph_query(0.01, "intent", 4);
        record_graph_failure("timeout");
        record_collaborator_fallback("stop_decider");
    }
}
