//! CLI entry point: generates a synthetic trace, replays it against a
//! `HostCache` backed by a scratch file, and prints the resulting report.

use clap::Parser;
use log::info;
use numa_block_cache::{CacheConfig, FileBackingStore, HostCache, WriteMode, WritebackRegistry};
use std::sync::Arc;
use workload_driver::generator::{self, GeneratorConfig};
use workload_driver::runner;

/// Replays synthetic READ/WRITE traffic against a numa-block-cache HostCache.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of requests to generate.
    #[arg(long, default_value_t = 10_000)]
    num_ops: usize,

    /// Cache-block size in bytes. Must be a power of two.
    #[arg(long, default_value_t = 4096)]
    block_size: u64,

    /// Total addressable blocks in the simulated LUN.
    #[arg(long, default_value_t = 4096)]
    working_set_blocks: u64,

    /// Total bytes of pinned cache buffer across all partitions.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    buffer_size: u64,

    /// Partitions per NUMA node.
    #[arg(long, default_value_t = 4)]
    cache_way: usize,

    /// Fraction of requests that are writes.
    #[arg(long, default_value_t = 0.2)]
    write_ratio: f64,

    /// Fraction of traffic directed at the hot subset of the working set.
    #[arg(long, default_value_t = 0.8)]
    hot_traffic_fraction: f64,

    /// Fraction of the working set that makes up the hot subset.
    #[arg(long, default_value_t = 0.2)]
    hot_set_fraction: f64,

    /// RNG seed for reproducible traces.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Use write-back instead of write-through for generated writes.
    #[arg(long)]
    write_back: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = CacheConfig::new(args.buffer_size, args.block_size as u32)
        .and_then(|c| c.with_cache_way(args.cache_way))
        .unwrap_or_else(|e| {
            eprintln!("invalid cache configuration: {e}");
            std::process::exit(1);
        });
    let write_mode = if args.write_back {
        WriteMode::WriteBack
    } else {
        WriteMode::WriteThrough
    };

    let host = Arc::new(HostCache::new(&config).unwrap_or_else(|e| {
        eprintln!("failed to bring up host cache: {e}");
        std::process::exit(1);
    }));
    info!(
        "host cache up: {} partitions, write_mode={write_mode:?}",
        host.partition_count()
    );

    let scratch = tempfile::NamedTempFile::new().expect("creating scratch backing file");
    let file_size = args.working_set_blocks * args.block_size;
    scratch.as_file().set_len(file_size).expect("sizing scratch backing file");
    let store: Arc<dyn numa_block_cache::BackingStore> =
        Arc::new(FileBackingStore::open(scratch.path(), false).expect("opening scratch backing file"));

    let writeback = if args.write_back {
        Some(WritebackRegistry::new(host.clone(), store.clone()))
    } else {
        None
    };

    let gen_config = GeneratorConfig {
        num_ops: args.num_ops,
        block_size: args.block_size,
        working_set_blocks: args.working_set_blocks,
        write_ratio: args.write_ratio,
        hot_traffic_fraction: args.hot_traffic_fraction,
        hot_set_fraction: args.hot_set_fraction,
        seed: args.seed,
    };
    let requests = generator::generate(&gen_config);
    info!("generated {} requests", requests.len());

    let report = runner::run(
        host.as_ref(),
        store.as_ref(),
        args.block_size,
        write_mode,
        writeback.as_ref(),
        &requests,
    );

    if let Some(registry) = writeback {
        registry.shutdown();
    }

    print!("{report}");
}
