//! Host cache configuration.
//!
//! A single [`CacheConfig`] is the entry point for bringing up a
//! [`crate::host_cache::HostCache`], the same "config struct as the only way
//! in" philosophy the builder-style segment configs in this crate's ancestry
//! used, generalized from a segment count to a NUMA partition layout. Unlike
//! those in-process configs, a host daemon needs to load these values from a
//! file at startup, so this module also owns the TOML loader.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Write policy for cache hits/misses on a WRITE command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Every WRITE updates the slot and is immediately flushed to the
    /// backing store before the command completes. Matches the hot path of
    /// the system this cache was ported from, which always writes the full
    /// block back despite carrying a dirty flag.
    WriteThrough,
    /// A WRITE updates the slot and marks it dirty; a per-LUN flusher
    /// thread drains dirty slots asynchronously (see [`crate::writeback`]).
    WriteBack,
}

impl Default for WriteMode {
    fn default() -> Self {
        WriteMode::WriteThrough
    }
}

/// Configuration for a [`crate::host_cache::HostCache`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Total bytes of pinned buffer across all partitions on all nodes.
    pub buffer_size: u64,
    /// Cache-block size in bytes. Must be a power of two.
    pub cbs: u32,
    /// Partitions per NUMA node. Defaults to 1.
    #[serde(default = "default_cache_way")]
    pub cache_way: usize,
    /// Number of consecutive cache blocks routed to the same partition.
    #[serde(default = "default_cb_group")]
    pub cb_group: u64,
    /// Alignment, in bytes, required for direct I/O buffers.
    #[serde(default = "default_dio_align")]
    pub dio_align: usize,
    /// Write-through vs write-back policy.
    #[serde(default)]
    pub write_mode: WriteMode,
}

fn default_cache_way() -> usize {
    1
}

fn default_cb_group() -> u64 {
    1
}

fn default_dio_align() -> usize {
    512
}

impl CacheConfig {
    /// Builds a config with the required fields and the documented
    /// defaults for everything else.
    #[must_use]
    pub fn new(buffer_size: u64, cbs: u32) -> Result<Self> {
        let config = CacheConfig {
            buffer_size,
            cbs,
            cache_way: default_cache_way(),
            cb_group: default_cb_group(),
            dio_align: default_dio_align(),
            write_mode: WriteMode::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Overrides the partitions-per-node count.
    #[must_use]
    pub fn with_cache_way(mut self, cache_way: usize) -> Result<Self> {
        self.cache_way = cache_way;
        self.validate()?;
        Ok(self)
    }

    /// Overrides the consecutive-block grouping.
    #[must_use]
    pub fn with_cb_group(mut self, cb_group: u64) -> Result<Self> {
        self.cb_group = cb_group;
        self.validate()?;
        Ok(self)
    }

    /// Overrides the write-through/write-back policy.
    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Loads and validates a config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
            CacheError::Config(format!("reading {}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a config from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CacheConfig =
            toml::from_str(raw).map_err(|e| CacheError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cbs == 0 || !self.cbs.is_power_of_two() {
            return Err(CacheError::Config(format!(
                "cbs must be a nonzero power of two, got {}",
                self.cbs
            )));
        }
        if self.buffer_size == 0 || self.buffer_size % u64::from(self.cbs) != 0 {
            return Err(CacheError::Config(format!(
                "buffer_size {} must be a nonzero multiple of cbs {}",
                self.buffer_size, self.cbs
            )));
        }
        if self.cache_way == 0 {
            return Err(CacheError::Config("cache_way must be nonzero".to_string()));
        }
        if self.cb_group == 0 {
            return Err(CacheError::Config("cb_group must be nonzero".to_string()));
        }
        Ok(())
    }
}
