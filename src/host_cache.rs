//! The full set of partitions for a host, and the pure routing arithmetic
//! that maps a cache-block id to the partition (and therefore the NUMA
//! node) that owns it.

use std::fmt;

use log::info;
use parking_lot::MutexGuard;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::metrics::CacheMetrics;
use crate::numa::Topology;
use crate::partition::{GuardedPartition, Partition};

/// All partitions for one host, plus the static routing rule between them.
///
/// Grounded on the way the segmented concurrent cache this crate started
/// from divides one logical capacity across `Box<[Mutex<Segment>]>`; here
/// the division is across NUMA nodes times a configurable partitions-per-node
/// count, and routing is a fixed arithmetic function of the cache-block id
/// rather than a hash of a generic key.
pub struct HostCache {
    partitions: Box<[GuardedPartition]>,
    partitions_per_node: usize,
    cache_way: usize,
    cb_group: u64,
    metrics: CacheMetrics,
}

impl HostCache {
    /// Brings up every partition for every node. All-or-nothing: if any
    /// partition fails to allocate or pin, construction fails and nothing
    /// is left half-built.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let topology = Topology::discover();
        let node_count = topology.node_count();
        let total_partitions = node_count * config.cache_way;
        let per_partition_bytes = (config.buffer_size as usize) / total_partitions;

        info!(
            "bringing up host cache: {node_count} nodes x {} partitions/node, {per_partition_bytes} bytes each",
            config.cache_way
        );

        let mut partitions = Vec::with_capacity(total_partitions);
        for i in 0..total_partitions {
            let node = i / config.cache_way;
            let partition = Partition::new(&topology, node, per_partition_bytes, config.cbs as usize)?;
            partitions.push(GuardedPartition::new(partition));
        }

        Ok(HostCache {
            partitions: partitions.into_boxed_slice(),
            partitions_per_node: config.cache_way,
            cache_way: config.cache_way,
            cb_group: config.cb_group,
            metrics: CacheMetrics::new(),
        })
    }

    /// The hit/miss/eviction/write-back counters for this host cache.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Number of partitions in this host cache.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partitions assigned to each node, as configured.
    pub fn partitions_per_node(&self) -> usize {
        self.partitions_per_node
    }

    /// Maps a cache-block id to the partition that owns it.
    pub fn partition_of(&self, cb_id: u64) -> usize {
        ((cb_id / self.cb_group) as usize) % self.partitions.len()
    }

    /// Maps a partition id to the node it is pinned to.
    pub fn node_of(&self, partition_id: usize) -> usize {
        partition_id / self.cache_way
    }

    /// Locks and returns the partition owning `cb_id`.
    pub fn lock_for(&self, cb_id: u64) -> MutexGuard<'_, Partition> {
        self.partitions[self.partition_of(cb_id)].lock()
    }

    /// Locks and returns the partition at `partition_id` directly.
    pub fn lock(&self, partition_id: usize) -> MutexGuard<'_, Partition> {
        self.partitions[partition_id].lock()
    }
}

impl fmt::Debug for HostCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCache")
            .field("partition_count", &self.partitions.len())
            .field("partitions_per_node", &self.partitions_per_node)
            .field("cb_group", &self.cb_group)
            .finish()
    }
}
