//! Prometheus metrics registry for tokbuk
//!
//! Counts admission decisions and tracks how many client buckets exist.
//! No per-key labels, since client keys are unbounded.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: admission decisions by outcome (`admitted`, `rejected`)
    pub admissions_total: IntCounterVec,
    /// Gauge: number of client buckets held by the bucket registry
    pub buckets: IntGauge,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("tokbuk".to_string()), None)?;

        let admissions_total = IntCounterVec::new(
            Opts::new("admissions_total", "Admission decisions by outcome"),
            &["decision"],
        )?;
        registry.register(Box::new(admissions_total.clone()))?;

        let buckets = IntGauge::new("buckets", "Number of client token buckets")?;
        registry.register(Box::new(buckets.clone()))?;

        Ok(Self {
            registry,
            admissions_total,
            buckets,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record one admission decision.
    pub fn record_admission(&self, admitted: bool) {
        let decision = if admitted { "admitted" } else { "rejected" };
        self.admissions_total.with_label_values(&[decision]).inc();
    }

    /// Set the bucket gauge to the registry's current size.
    pub fn set_buckets(&self, count: usize) {
        self.buckets.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Total decisions recorded for `decision`.
    pub fn admissions(&self, decision: &str) -> u64 {
        self.admissions_total.with_label_values(&[decision]).get()
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
