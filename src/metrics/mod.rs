//! Cache metrics.
//!
//! Grounded on the teacher's `CacheMetrics` trait and `BTreeMap<String, f64>`
//! reporting shape, replacing the per-policy counters (hits/evictions only)
//! with the full set this cache's operations produce: hits, misses, fills,
//! evictions, write-backs and write-backs-failed. Counters live behind
//! atomics rather than the teacher's plain `u64` fields, since partitions are
//! each guarded by their own mutex and metrics are read from outside any of
//! them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one [`crate::host_cache::HostCache`].
///
/// All increments use [`Ordering::Relaxed`]: counters are independent of one
/// another and never used to synchronize access to other state.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    reads: AtomicU64,
    read_hits: AtomicU64,
    writes: AtomicU64,
    write_hits: AtomicU64,
    fills: AtomicU64,
    evictions: AtomicU64,
    write_backs: AtomicU64,
    write_back_failures: AtomicU64,
}

impl CacheMetrics {
    /// Creates a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a READ sub-request, hit or miss.
    pub fn record_read(&self, hit: bool) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.read_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a WRITE sub-request, hit or miss.
    pub fn record_write(&self, hit: bool) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.write_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a cache-block fill from the backing store on a miss.
    pub fn record_fill(&self) {
        self.fills.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an LRU-tail eviction freeing a slot for reuse.
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed write-back flush.
    pub fn record_write_back(&self) {
        self.write_backs.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a write-back flush that failed and was left dirty for retry.
    pub fn record_write_back_failure(&self) {
        self.write_back_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// The read hit rate, or `0.0` if no reads have been recorded.
    pub fn read_hit_rate(&self) -> f64 {
        let reads = self.get(&self.reads);
        if reads == 0 {
            0.0
        } else {
            self.get(&self.read_hits) as f64 / reads as f64
        }
    }

    /// The write hit rate, or `0.0` if no writes have been recorded.
    pub fn write_hit_rate(&self) -> f64 {
        let writes = self.get(&self.writes);
        if writes == 0 {
            0.0
        } else {
            self.get(&self.write_hits) as f64 / writes as f64
        }
    }

    /// Returns every counter and derived rate as key-value pairs in
    /// deterministic (alphabetical) order, suitable for logging or export.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("evictions".to_string(), self.get(&self.evictions) as f64);
        m.insert("fills".to_string(), self.get(&self.fills) as f64);
        m.insert("read_hit_rate".to_string(), self.read_hit_rate());
        m.insert("read_hits".to_string(), self.get(&self.read_hits) as f64);
        m.insert("reads".to_string(), self.get(&self.reads) as f64);
        m.insert("write_back_failures".to_string(), self.get(&self.write_back_failures) as f64);
        m.insert("write_backs".to_string(), self.get(&self.write_backs) as f64);
        m.insert("write_hit_rate".to_string(), self.write_hit_rate());
        m.insert("write_hits".to_string(), self.get(&self.write_hits) as f64);
        m.insert("writes".to_string(), self.get(&self.writes) as f64);
        m
    }
}
