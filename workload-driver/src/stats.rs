//! Aggregate latency and hit-rate reporting for a completed run.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use numa_block_cache::CacheMetrics;

/// Latency and outcome summary for one replayed trace.
#[derive(Debug)]
pub struct RunReport {
    total_requests: usize,
    completed: usize,
    failed: usize,
    total_latency: Duration,
    max_latency: Duration,
    cache_counters: BTreeMap<String, f64>,
}

impl RunReport {
    pub(crate) fn new(total_requests: usize) -> Self {
        RunReport {
            total_requests,
            completed: 0,
            failed: 0,
            total_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            cache_counters: BTreeMap::new(),
        }
    }

    pub(crate) fn record_success(&mut self, latency: Duration) {
        self.completed += 1;
        self.total_latency += latency;
        self.max_latency = self.max_latency.max(latency);
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub(crate) fn finish(&mut self, metrics: &CacheMetrics) {
        self.cache_counters = metrics.snapshot();
    }

    /// Mean latency across every completed request, or zero if none completed.
    pub fn mean_latency(&self) -> Duration {
        if self.completed == 0 {
            Duration::ZERO
        } else {
            self.total_latency / self.completed as u32
        }
    }

    /// The slowest completed request.
    pub fn max_latency(&self) -> Duration {
        self.max_latency
    }

    /// Number of requests that returned an error.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// The underlying cache's counter snapshot at the end of the run.
    pub fn cache_counters(&self) -> &BTreeMap<String, f64> {
        &self.cache_counters
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} requests ({} completed, {} failed)",
            self.total_requests, self.completed, self.failed
        )?;
        writeln!(
            f,
            "latency: mean {:?}, max {:?}",
            self.mean_latency(),
            self.max_latency()
        )?;
        for (k, v) in &self.cache_counters {
            writeln!(f, "{k}: {v}")?;
        }
        Ok(())
    }
}
