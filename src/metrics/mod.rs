//! Performance Metrics Module
//!
//! Optional counters describing how a [`SyncMap`](crate::SyncMap) is being
//! used: how often lookups hit, how often an operation had to fall back to the
//! locked slow path, and how often the dirty tier was promoted. Recording is
//! skipped entirely while metrics are disabled.

use core::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of map performance counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapMetrics {
    /// Total number of recorded operations
    pub total_operations: u64,
    /// Operations that found, stored or swapped what they were asked to
    pub hit_operations: u64,
    /// Operations that found nothing or whose comparison failed
    pub miss_operations: u64,
    /// Operations that had to take the map lock
    pub slow_path_operations: u64,
    /// Number of times the dirty tier replaced the read tier
    pub promotions: u64,
    /// Average operation time in nanoseconds
    pub avg_operation_time_ns: u64,
    /// Maximum operation time in nanoseconds
    pub max_operation_time_ns: u64,
}

impl MapMetrics {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.hit_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    /// Share of operations that took the lock, as a percentage
    pub fn slow_path_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.slow_path_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    /// Average operation time as Duration
    pub fn avg_operation_time(&self) -> Duration {
        Duration::from_nanos(self.avg_operation_time_ns)
    }

    /// Maximum operation time as Duration
    pub fn max_operation_time(&self) -> Duration {
        Duration::from_nanos(self.max_operation_time_ns)
    }
}

/// Internal atomic metrics collection
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    total_operations: AtomicU64,
    hit_operations: AtomicU64,
    miss_operations: AtomicU64,
    slow_path_operations: AtomicU64,
    promotions: AtomicU64,
    total_time_ns: AtomicU64,
    max_time_ns: AtomicU64,
}

impl AtomicMetrics {
    /// Record a completed operation and whether it hit
    pub fn record_operation(&self, hit: bool, duration: Duration) {
        let duration_ns = duration.as_nanos() as u64;

        self.total_operations.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hit_operations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.miss_operations.fetch_add(1, Ordering::Relaxed);
        }
        self.total_time_ns.fetch_add(duration_ns, Ordering::Relaxed);
        self.max_time_ns.fetch_max(duration_ns, Ordering::Relaxed);
    }

    /// Record an operation that had to take the map lock
    pub fn record_slow_path(&self) {
        self.slow_path_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dirty-tier promotion
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MapMetrics {
        let total_ops = self.total_operations.load(Ordering::Relaxed);
        let total_time = self.total_time_ns.load(Ordering::Relaxed);

        MapMetrics {
            total_operations: total_ops,
            hit_operations: self.hit_operations.load(Ordering::Relaxed),
            miss_operations: self.miss_operations.load(Ordering::Relaxed),
            slow_path_operations: self.slow_path_operations.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            avg_operation_time_ns: if total_ops > 0 { total_time / total_ops } else { 0 },
            max_operation_time_ns: self.max_time_ns.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.total_operations.store(0, Ordering::Relaxed);
        self.hit_operations.store(0, Ordering::Relaxed);
        self.miss_operations.store(0, Ordering::Relaxed);
        self.slow_path_operations.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.total_time_ns.store(0, Ordering::Relaxed);
        self.max_time_ns.store(0, Ordering::Relaxed);
    }
}

/// Trait for data structures that support performance metrics
pub trait MetricsCollector {
    /// Get current performance metrics
    fn metrics(&self) -> MapMetrics;

    /// Reset all metrics
    fn reset_metrics(&self);

    /// Enable or disable metrics collection
    fn set_metrics_enabled(&self, enabled: bool);

    /// Check if metrics collection is enabled
    fn is_metrics_enabled(&self) -> bool;
}
