//! Prometheus metrics for shim-http-proxy.
//!
//! Tracks interception decisions, mock sources, generator health and
//! upstream failures.
use crate::cache::CacheMetrics;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Total number of requests answered by the proxy
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "shim_requests_total",
        "Total number of requests answered by the proxy",
        &["method", "status"]
    )
    .unwrap();

    /// Decision gate outcomes
    pub static ref DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "shim_decisions_total",
        "Interception decisions taken for upstream responses",
        &["decision"]  // decision: passthrough|intercept
    )
    .unwrap();

    /// Mock responses served
    pub static ref MOCK_RESPONSES_TOTAL: CounterVec = register_counter_vec!(
        "shim_mock_responses_total",
        "Mock responses served to clients",
        &["source"]  // source: cache|generated
    )
    .unwrap();

    /// Generator call duration
    pub static ref GENERATION_DURATION_MS: HistogramVec = register_histogram_vec!(
        "shim_generation_duration_ms",
        "Histogram of mock generation time in milliseconds",
        &["result"],  // result: ok|error
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0]
    )
    .unwrap();

    /// Upstream forwarding failures
    pub static ref UPSTREAM_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "shim_upstream_errors_total",
        "Requests that could not be forwarded to the upstream",
        &["kind"]  // kind: transport|timeout|request
    )
    .unwrap();

    /// Total request duration
    pub static ref PROXY_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "shim_proxy_request_duration_ms",
        "Total request duration including forwarding and mock generation",
        &["method", "outcome"],  // outcome: passthrough|mock|error|unrouted
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Mock cache counters, refreshed on every scrape
    pub static ref CACHE_STATS: GaugeVec = register_gauge_vec!(
        "shim_cache_stats",
        "Mock cache counters since startup, plus the current entry count",
        &["stat"]  // stat: hits|misses|inserts|invalidations|expirations|stale_writes|entries
    )
    .unwrap();

    pub static ref CACHE_HIT_RATIO: Gauge = register_gauge!(
        "shim_cache_hit_ratio",
        "Fraction of cache lookups that found a fresh entry"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record request processing
pub fn record_request(method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_decision(decision: &str) {
    DECISIONS_TOTAL.with_label_values(&[decision]).inc();
}

pub fn record_mock_response(source: &str) {
    MOCK_RESPONSES_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_generation(duration_ms: f64, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    GENERATION_DURATION_MS
        .with_label_values(&[result])
        .observe(duration_ms);
}

pub fn record_upstream_error(kind: &str) {
    UPSTREAM_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

fn cache_stats(snapshot: &CacheMetrics) -> [(&'static str, f64); 7] {
    [
        ("hits", snapshot.hits as f64),
        ("misses", snapshot.misses as f64),
        ("inserts", snapshot.inserts as f64),
        ("invalidations", snapshot.invalidations as f64),
        ("expirations", snapshot.expirations as f64),
        ("stale_writes", snapshot.stale_writes as f64),
        ("entries", snapshot.size as f64),
    ]
}

/// Publish a cache snapshot
pub fn record_cache(snapshot: &CacheMetrics) {
    for (stat, value) in cache_stats(snapshot) {
        CACHE_STATS.with_label_values(&[stat]).set(value);
    }
    CACHE_HIT_RATIO.set(snapshot.hit_rate());
}

pub fn record_proxy_duration(method: &str, duration_ms: f64, outcome: &str) {
    PROXY_REQUEST_DURATION_MS
        .with_label_values(&[method, outcome])
        .observe(duration_ms);
}
