//! Metrics module
//!
//! Per-group counters and their Prometheus exposition.

pub mod exporter;
mod stats;

pub use exporter::MetricsExporter;
pub use stats::{GroupStats, StatsSnapshot};
