//! Metrics collection and reporting
//! Follows SRP: Only responsible for metrics collection and export

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics::{counter, gauge};
use provrelay_system::StatsSnapshot;
use serde::Serialize;

/// Metrics collector for daemon statistics
pub struct MetricsCollector {
    start_time: Instant,
    records_observed: AtomicU64,
    records_written: AtomicU64,
    records_suppressed: AtomicU64,
    errors_count: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            records_observed: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            records_suppressed: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
        }
    }

    /// Record a correctly sized record seen by the handler
    pub fn record_observed(&self) {
        counter!("provrelay_records_observed_total").increment(1);
        self.records_observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record written to the output, by handler-level kind
    pub fn record_record(&self, kind: &'static str) {
        counter!("provrelay_records_written_total").increment(1);
        counter!("provrelay_records_by_kind_total", "kind" => kind).increment(1);
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record dropped by the suppress list
    pub fn record_suppressed(&self, kind: &'static str) {
        counter!("provrelay_records_suppressed_total", "kind" => kind).increment(1);
        self.records_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error
    pub fn record_error(&self) {
        counter!("provrelay_errors_total").increment(1);
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Update relay statistics
    pub fn update_relay_stats(&self, stats: &StatsSnapshot, cached_names: usize) {
        gauge!("provrelay_short_records").set(stats.short_records as f64);
        gauge!("provrelay_long_records").set(stats.long_records as f64);
        gauge!("provrelay_filtered_records").set(stats.filtered as f64);
        gauge!("provrelay_decode_errors").set(stats.decode_errors as f64);
        gauge!("provrelay_io_errors").set(stats.io_errors as f64);
        gauge!("provrelay_drains").set(stats.drains as f64);
        gauge!("provrelay_name_cache_entries").set(cached_names as f64);

        let records = stats.short_records + stats.long_records;
        let per_drain = if stats.drains > 0 {
            records as f64 / stats.drains as f64
        } else {
            0.0
        };
        gauge!("provrelay_records_per_drain").set(per_drain);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> MetricsStats {
        MetricsStats {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            records_observed: self.records_observed.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            records_suppressed: self.records_suppressed.load(Ordering::Relaxed),
            errors_count: self.errors_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MetricsStats {
    pub uptime_seconds: u64,
    pub records_observed: u64,
    pub records_written: u64,
    pub records_suppressed: u64,
    pub errors_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector.record_observed();
        collector.record_record("task");
        collector.record_record("path");
        collector.record_suppressed("inode");
        collector.record_error();

        let stats = collector.get_stats();
        assert_eq!(stats.records_observed, 1);
        assert_eq!(stats.records_written, 2);
        assert_eq!(stats.records_suppressed, 1);
        assert_eq!(stats.errors_count, 1);
    }

    #[test]
    fn test_relay_stats_without_recorder() {
        // no global recorder installed; the macros must be no-ops
        let collector = MetricsCollector::new();
        let snapshot = StatsSnapshot {
            short_records: 10,
            long_records: 2,
            drains: 3,
            ..Default::default()
        };
        collector.update_relay_stats(&snapshot, 1);
        assert_eq!(collector.get_stats().records_written, 0);
    }
}
