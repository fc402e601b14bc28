//! Prometheus exposition of group statistics
//!
//! Counters live in each group's [`GroupStats`](super::GroupStats); the
//! exporter advances its Prometheus counters to the latest snapshot on
//! every scrape. Tier usage is exported as gauges.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry as PromRegistry, TextEncoder};

use crate::error::{Error, Result};
use crate::group::{CacheType, Registry};

/// Series for every registered group
pub struct MetricsExporter {
    registry: PromRegistry,
    events: IntCounterVec,
    tier_entries: IntGaugeVec,
    tier_bytes: IntGaugeVec,
}

impl MetricsExporter {
    pub fn new() -> Result<Self> {
        let registry = PromRegistry::new();

        let events = IntCounterVec::new(
            Opts::new("peercache_group_events_total", "Lookup events per group"),
            &["event", "group"],
        )
        .map_err(metrics_error)?;
        let tier_entries = IntGaugeVec::new(
            Opts::new("peercache_tier_entries", "Entries held per cache tier"),
            &["group", "tier"],
        )
        .map_err(metrics_error)?;
        let tier_bytes = IntGaugeVec::new(
            Opts::new("peercache_tier_bytes", "Bytes used per cache tier"),
            &["group", "tier"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(events.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(tier_entries.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(tier_bytes.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            events,
            tier_entries,
            tier_bytes,
        })
    }

    /// Refresh all series from `groups`
    pub fn update(&self, groups: &Registry) {
        for group in groups.groups() {
            let name = group.name();
            for (event, value) in group.stats().counters() {
                let counter = self.events.with_label_values(&[event, name]);
                // a replaced group stays flat until it passes the exported value
                let current = counter.get();
                if value > current {
                    counter.inc_by(value - current);
                }
            }
            for tier in [CacheType::Main, CacheType::Hot] {
                let usage = group.cache_stats(tier);
                let tier = tier.to_string();
                self.tier_entries
                    .with_label_values(&[name, tier.as_str()])
                    .set(clamp(usage.entries as u64));
                self.tier_bytes
                    .with_label_values(&[name, tier.as_str()])
                    .set(clamp(usage.used_bytes));
            }
        }
    }

    /// Refresh and encode in the Prometheus text format
    pub fn render(&self, groups: &Registry) -> Result<String> {
        self.update(groups);

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics encoding: {}", e)))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}
