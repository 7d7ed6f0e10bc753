//! Refresh metrics
//!
//! The orchestrator reports through the [`DiscoveryMetrics`] trait, which is
//! handed to it at construction instead of touching process-wide globals.
//!
//! - [`PrometheusMetrics`]: registered on a prometheus [`Registry`] for scraping
//! - [`RecordingMetrics`]: plain atomics, for tests and embedding

use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

/// Sink for the two refresh metrics
pub trait DiscoveryMetrics: Send + Sync {
    /// Record the wall-clock duration of one refresh call
    fn observe_refresh_duration(&self, seconds: f64);

    /// Count one failed refresh call
    fn inc_refresh_failures(&self);
}

pub const REFRESH_FAILURES_METRIC: &str = "prometheus_sd_oci_refresh_failures_total";
pub const REFRESH_DURATION_METRIC: &str = "prometheus_sd_oci_refresh_duration_seconds";

/// Metrics backed by the prometheus client
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    failures: Counter,
    duration: Histogram,
}

impl PrometheusMetrics {
    /// Create both metrics and register them on `registry`
    pub fn register(registry: Registry) -> prometheus::Result<Self> {
        let failures = Counter::with_opts(Opts::new(
            REFRESH_FAILURES_METRIC,
            "The number of OCI-SD refresh failures.",
        ))?;
        let duration = Histogram::with_opts(HistogramOpts::new(
            REFRESH_DURATION_METRIC,
            "The duration of a OCI-SD refresh in seconds.",
        ))?;

        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            failures,
            duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Everything in the registry in the text exposition format
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl DiscoveryMetrics for PrometheusMetrics {
    fn observe_refresh_duration(&self, seconds: f64) {
        self.duration.observe(seconds);
    }

    fn inc_refresh_failures(&self) {
        self.failures.inc();
    }
}

/// Metrics kept in atomics
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    failures: AtomicU64,
    refreshes: AtomicU64,

    /// Last observed duration, stored as `f64` bits
    last_duration: AtomicU64,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Number of observed refresh calls, successful or not
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn last_duration(&self) -> f64 {
        f64::from_bits(self.last_duration.load(Ordering::SeqCst))
    }
}

impl DiscoveryMetrics for RecordingMetrics {
    fn observe_refresh_duration(&self, seconds: f64) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.last_duration.store(seconds.to_bits(), Ordering::SeqCst);
    }

    fn inc_refresh_failures(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}
