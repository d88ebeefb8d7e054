//! tokbuk Telemetry - Admission metrics
//!
//! Provides:
//! - `MetricsRegistry`: Prometheus counters and gauges for admission decisions
//! - `MetricsServer`: HTTP server for Prometheus scraping

pub mod metrics;
pub mod server;

pub use metrics::MetricsRegistry;
pub use server::MetricsServer;
