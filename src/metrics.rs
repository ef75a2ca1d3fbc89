//! Store Metrics
//!
//! Operation counters, expiry/persistence counters and latency tracking.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Total operations count
    total_ops: AtomicU64,

    /// Operations per operation name
    ops_by_name: RwLock<HashMap<&'static str, u64>>,

    /// Entries removed by a `get` that found them expired
    lazy_evictions: AtomicU64,
    /// Entries removed by the sweeper
    swept: AtomicU64,

    flushes: AtomicU64,
    flush_failures: AtomicU64,

    /// Latency tracking (simplified)
    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            total_ops: AtomicU64::new(0),
            ops_by_name: RwLock::new(HashMap::new()),
            lazy_evictions: AtomicU64::new(0),
            swept: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
        }
    }

    /// Record an operation
    pub fn record_operation(&self, name: &'static str, latency: Duration) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);

        *self.ops_by_name.write().entry(name).or_insert(0) += 1;

        let latency_us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_min_us.fetch_min(latency_us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    pub fn record_lazy_eviction(&self) {
        self.lazy_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, removed: usize) {
        self.swept.fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Record the result of a snapshot flush
    pub fn record_flush(&self, ok: bool) {
        if ok {
            self.flushes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.flush_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get total operations count
    pub fn total_ops(&self) -> u64 {
        self.total_ops.load(Ordering::Relaxed)
    }

    /// Get operations by name
    pub fn ops_by_name(&self) -> HashMap<&'static str, u64> {
        self.ops_by_name.read().clone()
    }

    pub fn lazy_evictions(&self) -> u64 {
        self.lazy_evictions.load(Ordering::Relaxed)
    }

    pub fn swept(&self) -> u64 {
        self.swept.load(Ordering::Relaxed)
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    /// Get average latency in microseconds
    pub fn avg_latency_us(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        sum as f64 / count as f64
    }

    /// Get min latency in microseconds
    pub fn min_latency_us(&self) -> u64 {
        let min = self.latency_min_us.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    /// Get max latency in microseconds
    pub fn max_latency_us(&self) -> u64 {
        self.latency_max_us.load(Ordering::Relaxed)
    }

    /// Get a summary of metrics
    pub fn summary(&self) -> String {
        format!(
            "Operations: {} | Expired: lazy={}, swept={} | Flushes: ok={}, failed={} | Latency (µs): avg={:.1}, min={}, max={}",
            self.total_ops(),
            self.lazy_evictions(),
            self.swept(),
            self.flushes(),
            self.flush_failures(),
            self.avg_latency_us(),
            self.min_latency_us(),
            self.max_latency_us()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = Metrics::new();

        metrics.record_operation("get", Duration::from_micros(100));
        metrics.record_operation("get", Duration::from_micros(200));
        metrics.record_operation("create", Duration::from_micros(150));

        assert_eq!(metrics.total_ops(), 3);
        assert_eq!(metrics.min_latency_us(), 100);
        assert_eq!(metrics.max_latency_us(), 200);
        assert!((metrics.avg_latency_us() - 150.0).abs() < 0.1);

        let by_name = metrics.ops_by_name();
        assert_eq!(by_name.get("get"), Some(&2));
        assert_eq!(by_name.get("create"), Some(&1));
    }

    #[test]
    fn test_expiry_and_flush_counters() {
        let metrics = Metrics::new();
        assert_eq!(metrics.min_latency_us(), 0);

        metrics.record_lazy_eviction();
        metrics.record_swept(4);
        metrics.record_flush(true);
        metrics.record_flush(false);
        metrics.record_flush(false);

        assert_eq!(metrics.lazy_evictions(), 1);
        assert_eq!(metrics.swept(), 4);
        assert_eq!(metrics.flushes(), 1);
        assert_eq!(metrics.flush_failures(), 2);
        assert!(metrics.summary().contains("swept=4"));
    }
}
