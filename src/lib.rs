//! A NUMA-aware block cache for a SCSI-style storage target.
//!
//! The host's cache capacity is split into partitions, each pinned to one
//! NUMA node and guarded by its own lock, so that hot-path lookups never
//! cross a node boundary or contend with a partition some other CPU is
//! servicing. A fixed arena of cache-block-sized slots is preallocated once
//! per partition; admission, eviction, and lookup only ever move slots
//! between a free list, an LRU list, and a hash-bucket chain, never touching
//! the global allocator on the data path.
//!
//! ```text
//! Command (READ/WRITE/...)
//!     -> splitter: decompose into block-aligned sub-requests
//!     -> host_cache: route each sub-request to its owning partition
//!     -> io_engine: hit copies bytes and touches LRU; miss admits,
//!        fills from the backing store, and publishes
//!     -> writeback (write-back mode only): dirty slots drain through a
//!        per-LUN queue to a background flusher
//! ```
//!
//! # Modules
//!
//! - [`numa`]: NUMA topology discovery and node-pinned allocation.
//! - [`slot`]: the fixed slot arena and its intrusive free/LRU/hash links.
//! - [`hash`]: the cache-block-id hash index over the arena.
//! - [`partition`]: one NUMA-pinned partition's admit/touch/publish/invalidate API.
//! - [`host_cache`]: the full set of partitions and the routing rule between them.
//! - [`config`]: cache sizing, write mode, and TOML configuration loading.
//! - [`backing_store`]: the positional-I/O interface to a LUN's persistent bytes.
//! - [`splitter`]: block-alignment decomposition and NUMA affinity selection.
//! - [`io_engine`]: per-sub-request hit/miss/fill/write handling.
//! - [`special_ops`]: opcodes serviced directly against the backing store.
//! - [`writeback`]: per-LUN dirty queues and flusher threads for write-back mode.
//! - [`command`]: the typed opcode enum and the top-level dispatch entry point.
//! - [`error`]: cache errors and their SAM sense-key/ASC mapping.
//! - [`metrics`]: hit/miss/eviction/write-back counters.

/// Cache errors and SCSI sense-code mapping.
pub mod error;

/// NUMA topology discovery and node-pinned memory allocation.
pub mod numa;

/// The fixed slot arena: cache-block storage plus intrusive list links.
pub mod slot;

/// The cache-block-id hash index over a slot arena.
pub mod hash;

/// One NUMA-pinned cache partition.
pub mod partition;

/// The full set of partitions for a host and the routing rule between them.
pub mod host_cache;

/// Cache sizing, write-mode, and configuration loading.
pub mod config;

/// The positional-I/O interface to a LUN's persistent backing bytes.
pub mod backing_store;

/// Block-alignment request splitting and NUMA affinity selection.
pub mod splitter;

/// Per-sub-request hit/miss/fill/write handling.
pub mod io_engine;

/// Opcodes serviced directly against the backing store.
pub mod special_ops;

/// Per-LUN dirty queues and flusher threads for write-back mode.
pub mod writeback;

/// The typed command enum and the top-level dispatch entry point.
pub mod command;

/// Hit/miss/eviction/write-back counters.
pub mod metrics;

pub use backing_store::{BackingStore, FileBackingStore};
pub use command::{dispatch, AffinityHint, Command};
pub use config::{CacheConfig, WriteMode};
pub use error::{CacheError, Result};
pub use host_cache::HostCache;
pub use metrics::CacheMetrics;
pub use writeback::{DirtyItem, LunKey, WritebackRegistry};
