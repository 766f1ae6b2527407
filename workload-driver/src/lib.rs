//! Synthetic traffic generation and replay against a [`numa_block_cache::HostCache`].
//!
//! Repurposes the teacher crate's cache-eviction-policy simulator into a
//! driver for this crate's single NUMA-partitioned cache: it no longer
//! compares policies, but it still generates request traces and reports
//! hit-rate/latency the way the original simulator did.

/// Synthetic trace generation.
pub mod generator;
/// The request/operation types a trace is made of.
pub mod models;
/// Replays a trace against a `HostCache` and collects a [`stats::RunReport`].
pub mod runner;
/// Latency and hit-rate aggregation and reporting.
pub mod stats;
