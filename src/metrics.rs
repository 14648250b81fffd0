//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub cycles_started: IntCounter,
    pub bundles_submitted: IntCounter,
    pub bundles_rejected: IntCounter,
    pub stream_faults: IntCounter,
    pub cycles_aborted: IntCounterVec,
    pub bundle_results: IntCounterVec,

    // Histograms
    pub anchor_latency: Histogram,
    pub submit_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_started = IntCounter::with_opts(Opts::new(
            "bundle_cycles_started_total",
            "Number of submission cycles started",
        ))?;

        let bundles_submitted = IntCounter::with_opts(Opts::new(
            "bundles_submitted_total",
            "Number of bundles acknowledged by the relay",
        ))?;

        let bundles_rejected = IntCounter::with_opts(Opts::new(
            "bundles_rejected_total",
            "Number of bundle submissions that failed",
        ))?;

        let stream_faults = IntCounter::with_opts(Opts::new(
            "bundle_result_stream_faults_total",
            "Number of result stream faults",
        ))?;

        let cycles_aborted = IntCounterVec::new(
            Opts::new(
                "bundle_cycles_aborted_total",
                "Submission cycles aborted before submission, by error category",
            ),
            &["category"],
        )?;

        let bundle_results = IntCounterVec::new(
            Opts::new("bundle_results_total", "Bundle results observed, by outcome"),
            &["outcome"],
        )?;

        let anchor_latency = Histogram::with_opts(
            HistogramOpts::new("anchor_latency_seconds", "Recency anchor fetch latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        )?;

        let submit_latency = Histogram::with_opts(
            HistogramOpts::new("submit_latency_seconds", "sendBundle latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(cycles_started.clone()))?;
        registry.register(Box::new(bundles_submitted.clone()))?;
        registry.register(Box::new(bundles_rejected.clone()))?;
        registry.register(Box::new(stream_faults.clone()))?;
        registry.register(Box::new(cycles_aborted.clone()))?;
        registry.register(Box::new(bundle_results.clone()))?;
        registry.register(Box::new(anchor_latency.clone()))?;
        registry.register(Box::new(submit_latency.clone()))?;

        Ok(Self {
            registry,
            cycles_started,
            bundles_submitted,
            bundles_rejected,
            stream_faults,
            cycles_aborted,
            bundle_results,
            anchor_latency,
            submit_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
