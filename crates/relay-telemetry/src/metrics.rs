//! Prometheus metrics for the broker.
//!
//! All metrics follow the naming convention: `relay_<subject>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., sessions_total)
//! - **Gauge**: Value that can go up or down (e.g., sessions_active)
//! - **Histogram**: Distribution of values (e.g., auth_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SESSION METRICS
    // =========================================================================

    /// Currently open WebSocket sessions
    pub static ref SESSIONS_ACTIVE: Gauge = Gauge::new(
        "relay_sessions_active",
        "Number of currently open WebSocket sessions"
    ).expect("metric creation failed");

    /// Sessions accepted since start
    pub static ref SESSIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("relay_sessions_total", "Total WebSocket sessions accepted"),
        &["listener"]  // listener: public/stats
    ).expect("metric creation failed");

    /// Sessions refused at capacity
    pub static ref SESSIONS_REJECTED: Counter = Counter::new(
        "relay_sessions_rejected_total",
        "Sessions refused because the listener was at capacity"
    ).expect("metric creation failed");

    // =========================================================================
    // ROUTING METRICS
    // =========================================================================

    /// Envelopes received from authenticated sessions
    pub static ref ENVELOPES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new(
            "relay_envelopes_received_total",
            "Envelopes received from authenticated sessions"
        ),
        &["kind"]  // kind: request/update/response_error/response_success
    ).expect("metric creation failed");

    /// Channel operations executed by the registry
    pub static ref CHANNEL_OPERATIONS: CounterVec = CounterVec::new(
        Opts::new(
            "relay_channel_operations_total",
            "Channel operations executed by the registry"
        ),
        &["command"]
    ).expect("metric creation failed");

    /// Payload bytes carried by published updates
    pub static ref CHANNEL_UPDATE_BYTES: Counter = Counter::new(
        "relay_channel_update_bytes_total",
        "Payload bytes carried by published updates"
    ).expect("metric creation failed");

    // =========================================================================
    // AUTHENTICATION METRICS
    // =========================================================================

    /// Login attempts by outcome
    pub static ref AUTH_ATTEMPTS: CounterVec = CounterVec::new(
        Opts::new("relay_auth_attempts_total", "Login attempts by outcome"),
        &["outcome"]  // outcome: success/failed
    ).expect("metric creation failed");

    /// Credential verification duration
    pub static ref AUTH_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "relay_auth_duration_seconds",
            "Time spent verifying credentials"
        ).buckets(exponential_buckets(0.001, 2.0, 15).unwrap())
    ).expect("metric creation failed");
}

/// Handle for the metrics registry
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Sessions
        Box::new(SESSIONS_ACTIVE.clone()),
        Box::new(SESSIONS_TOTAL.clone()),
        Box::new(SESSIONS_REJECTED.clone()),
        // Routing
        Box::new(ENVELOPES_RECEIVED.clone()),
        Box::new(CHANNEL_OPERATIONS.clone()),
        Box::new(CHANNEL_UPDATE_BYTES.clone()),
        // Authentication
        Box::new(AUTH_ATTEMPTS.clone()),
        Box::new(AUTH_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
