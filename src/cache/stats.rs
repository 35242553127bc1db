//! Cache Statistics Module
//!
//! Concurrency-safe counters for hits, misses, stored keys and values, and per-tier activity.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

// == Cache Statistics ==
/// Live counters shared by every caller of an engine.
///
/// `total_values` counts stored records. `total_keys` counts lookup handles: every record
/// has its string key, and a record carrying a numeric id has a second handle.
#[derive(Debug)]
pub struct CacheStatistics {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    total_keys: AtomicU64,
    total_values: AtomicU64,
    evictions: AtomicU64,

    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l1_puts: AtomicU64,
    l1_evictions: AtomicU64,

    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    l2_puts: AtomicU64,
    l2_errors: AtomicU64,

    created_at: DateTime<Utc>,
    last_reset_at: RwLock<DateTime<Utc>>,
}

impl Default for CacheStatistics {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            total_keys: AtomicU64::new(0),
            total_values: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            l1_hits: AtomicU64::new(0),
            l1_misses: AtomicU64::new(0),
            l1_puts: AtomicU64::new(0),
            l1_evictions: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            l2_misses: AtomicU64::new(0),
            l2_puts: AtomicU64::new(0),
            l2_errors: AtomicU64::new(0),
            created_at: now,
            last_reset_at: RwLock::new(now),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn saturating_sub(counter: &AtomicU64, n: u64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(n))
    });
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl CacheStatistics {
    // == Constructor ==
    /// Creates a new tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Request Tracking ==
    /// Records a request served with a result.
    pub fn record_hit(&self) {
        bump(&self.requests);
        bump(&self.hits);
    }

    /// Records a request that found nothing live.
    pub fn record_miss(&self) {
        bump(&self.requests);
        bump(&self.misses);
    }

    // == Stored Totals ==
    /// Adds newly stored records and their lookup handles.
    pub fn add_stored(&self, values: u64, keys: u64) {
        self.total_values.fetch_add(values, Ordering::Relaxed);
        self.total_keys.fetch_add(keys, Ordering::Relaxed);
    }

    /// Removes deleted records and their lookup handles, never going below zero.
    pub fn remove_stored(&self, values: u64, keys: u64) {
        saturating_sub(&self.total_values, values);
        saturating_sub(&self.total_keys, keys);
    }

    /// Records an eviction outside any tier (e.g. lazy expiry).
    pub fn record_eviction(&self) {
        bump(&self.evictions);
    }

    // == L1 Tracking ==
    pub fn record_l1_hit(&self) {
        bump(&self.l1_hits);
    }

    pub fn record_l1_miss(&self) {
        bump(&self.l1_misses);
    }

    pub fn record_l1_put(&self) {
        bump(&self.l1_puts);
    }

    /// Counts toward both the L1 and the overall eviction totals.
    pub fn record_l1_eviction(&self) {
        bump(&self.l1_evictions);
        bump(&self.evictions);
    }

    // == L2 Tracking ==
    pub fn record_l2_hit(&self) {
        bump(&self.l2_hits);
    }

    pub fn record_l2_miss(&self) {
        bump(&self.l2_misses);
    }

    pub fn record_l2_put(&self) {
        bump(&self.l2_puts);
    }

    pub fn record_l2_error(&self) {
        bump(&self.l2_errors);
    }

    // == Accessors ==
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total_keys(&self) -> u64 {
        self.total_keys.load(Ordering::Relaxed)
    }

    pub fn total_values(&self) -> u64 {
        self.total_values.load(Ordering::Relaxed)
    }

    // == Derived Metrics ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        ratio(hits, hits + self.misses())
    }

    /// Returns total keys / total values, or 0.0 when nothing is stored.
    pub fn keys_to_values_ratio(&self) -> f64 {
        ratio(self.total_keys(), self.total_values())
    }

    // == Reset ==
    /// Zeroes every counter and stamps the reset time.
    pub fn reset(&self) {
        self.total_keys.store(0, Ordering::Relaxed);
        self.total_values.store(0, Ordering::Relaxed);
        self.reset_activity();
    }

    /// Zeroes request, eviction and tier counters, leaving the stored totals alone.
    pub fn reset_activity(&self) {
        for counter in [
            &self.requests,
            &self.hits,
            &self.misses,
            &self.evictions,
            &self.l1_hits,
            &self.l1_misses,
            &self.l1_puts,
            &self.l1_evictions,
            &self.l2_hits,
            &self.l2_misses,
            &self.l2_puts,
            &self.l2_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.last_reset_at.write() = Utc::now();
    }

    // == Snapshot ==
    /// Returns a point-in-time copy that later activity cannot change.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        StatisticsSnapshot {
            requests: load(&self.requests),
            hits: load(&self.hits),
            misses: load(&self.misses),
            total_keys: load(&self.total_keys),
            total_values: load(&self.total_values),
            evictions: load(&self.evictions),
            l1: TierSnapshot {
                hits: load(&self.l1_hits),
                misses: load(&self.l1_misses),
                puts: load(&self.l1_puts),
                evictions: load(&self.l1_evictions),
                errors: 0,
            },
            l2: TierSnapshot {
                hits: load(&self.l2_hits),
                misses: load(&self.l2_misses),
                puts: load(&self.l2_puts),
                evictions: 0,
                errors: load(&self.l2_errors),
            },
            created_at: self.created_at,
            last_reset_at: *self.last_reset_at.read(),
        }
    }
}

// == Snapshots ==
/// Immutable copy of the statistics for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub total_keys: u64,
    pub total_values: u64,
    pub evictions: u64,
    pub l1: TierSnapshot,
    pub l2: TierSnapshot,
    pub created_at: DateTime<Utc>,
    pub last_reset_at: DateTime<Utc>,
}

impl StatisticsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// 1 − hit rate, or 0.0 if no requests have been made.
    pub fn miss_rate(&self) -> f64 {
        ratio(self.misses, self.hits + self.misses)
    }

    pub fn keys_to_values_ratio(&self) -> f64 {
        ratio(self.total_keys, self.total_values)
    }
}

/// Counters for one tier. Unused counters for a tier stay zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub errors: u64,
}

impl TierSnapshot {
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_stats_new() {
        let stats = CacheStatistics::new();
        let snap = stats.snapshot();
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.misses, 0);
        assert_eq!(snap.total_keys, 0);
        assert_eq!(snap.total_values, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStatistics::new();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.snapshot().miss_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let stats = CacheStatistics::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(stats.snapshot().miss_rate(), 0.25);
        assert_eq!(stats.snapshot().requests, 4);
    }

    #[test]
    fn test_keys_to_values_ratio() {
        let stats = CacheStatistics::new();
        assert_eq!(stats.keys_to_values_ratio(), 0.0);

        stats.add_stored(2, 3);
        assert_eq!(stats.keys_to_values_ratio(), 1.5);
    }

    #[test]
    fn test_remove_stored_saturates() {
        let stats = CacheStatistics::new();
        stats.add_stored(1, 1);
        stats.remove_stored(5, 5);
        assert_eq!(stats.total_values(), 0);
        assert_eq!(stats.total_keys(), 0);
    }

    #[test]
    fn test_l1_eviction_counts_overall() {
        let stats = CacheStatistics::new();
        stats.record_l1_eviction();
        stats.record_eviction();
        let snap = stats.snapshot();
        assert_eq!(snap.l1.evictions, 1);
        assert_eq!(snap.evictions, 2);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = CacheStatistics::new();
        stats.record_hit();
        stats.record_miss();
        stats.add_stored(3, 4);
        stats.record_l1_put();
        stats.record_l2_error();
        let before = stats.snapshot().last_reset_at;

        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.misses, 0);
        assert_eq!(snap.total_keys, 0);
        assert_eq!(snap.total_values, 0);
        assert_eq!(snap.l1, TierSnapshot::default());
        assert_eq!(snap.l2, TierSnapshot::default());
        assert!(snap.last_reset_at >= before);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let stats = CacheStatistics::new();
        stats.record_hit();
        let snap = stats.snapshot();
        stats.record_hit();
        assert_eq!(snap.hits, 1);
        assert_eq!(stats.hits(), 2);
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = Arc::new(CacheStatistics::new());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let stats = Arc::clone(&stats);
                scope.spawn(move || {
                    for _ in 0..1000 {
                        stats.record_hit();
                        stats.record_miss();
                    }
                });
            }
        });
        assert_eq!(stats.hits(), 8000);
        assert_eq!(stats.misses(), 8000);
    }
}
