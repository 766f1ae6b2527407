//! Synthetic request-trace generation.
//!
//! Grounded on the teacher crate's `generator` module, which produced request
//! traces for comparing eviction policies; this keeps the "hot working set"
//! skew model (most traffic lands on a small, recently-touched fraction of
//! the address space) but targets a single `HostCache` instance instead of
//! a generic policy under test.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{Operation, Request};

/// Parameters controlling trace generation.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    /// Number of requests to generate.
    pub num_ops: usize,
    /// Cache-block size in bytes; every generated request is exactly one
    /// block long and block-aligned, so the runner never has to split it.
    pub block_size: u64,
    /// Total addressable blocks in the simulated LUN.
    pub working_set_blocks: u64,
    /// Fraction of requests that are writes, in `[0.0, 1.0]`.
    pub write_ratio: f64,
    /// Fraction of requests directed at the hot subset (`hot_fraction` of
    /// `working_set_blocks`). `0.0` degenerates to a uniform distribution.
    pub hot_traffic_fraction: f64,
    /// Fraction of `working_set_blocks` that makes up the hot subset.
    pub hot_set_fraction: f64,
    /// RNG seed, for reproducible traces.
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            num_ops: 10_000,
            block_size: 4096,
            working_set_blocks: 4096,
            write_ratio: 0.2,
            hot_traffic_fraction: 0.8,
            hot_set_fraction: 0.2,
            seed: 0,
        }
    }
}

/// Generates `config.num_ops` block-aligned requests per `config`.
pub fn generate(config: &GeneratorConfig) -> Vec<Request> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let hot_blocks = ((config.working_set_blocks as f64) * config.hot_set_fraction).max(1.0) as u64;

    (0..config.num_ops)
        .map(|_| {
            let in_hot_set = rng.gen_bool(config.hot_traffic_fraction.clamp(0.0, 1.0));
            let block = if in_hot_set {
                rng.gen_range(0..hot_blocks)
            } else {
                rng.gen_range(0..config.working_set_blocks)
            };
            let op = if rng.gen_bool(config.write_ratio.clamp(0.0, 1.0)) {
                Operation::Write
            } else {
                Operation::Read
            };
            Request {
                op,
                offset: block * config.block_size,
                length: config.block_size,
            }
        })
        .collect()
}
