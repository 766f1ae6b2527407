//! Splitter throughput and partition hit/miss latency, the two hot paths
//! called out as the cache's performance-critical arithmetic.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use numa_block_cache::{CacheConfig, HostCache};
use std::hint::black_box as hint_black_box;

fn bench_splitter(c: &mut Criterion) {
    let mut group = c.benchmark_group("splitter");
    for &(offset, length) in &[(0u64, 4096u64), (100, 8000), (4096, 4096 * 16)] {
        group.bench_function(format!("split({offset},{length})"), |b| {
            b.iter(|| {
                let subs = numa_block_cache::splitter::split(0, 0, black_box(offset), black_box(length), 4096, |cb| cb as usize);
                hint_black_box(subs.len());
            });
        });
    }
    group.finish();
}

fn bench_partition_hit_miss(c: &mut Criterion) {
    let config = CacheConfig::new(1 << 20, 4096).unwrap().with_cache_way(1).unwrap();
    let host = HostCache::new(&config).unwrap();
    let store = numa_block_cache::FileBackingStore::open(
        {
            let f = tempfile::NamedTempFile::new().unwrap();
            f.as_file().set_len(1 << 20).unwrap();
            f.into_temp_path().keep().unwrap()
        },
        false,
    )
    .unwrap();

    let mut group = c.benchmark_group("partition");
    group.bench_function("read_miss_then_hit", |b| {
        b.iter(|| {
            let subs = numa_block_cache::splitter::split(0, 0, 0, 4096, 4096, |cb| host.partition_of(cb));
            let mut buf = vec![0u8; 4096];
            numa_block_cache::io_engine::service_read(&host, &store, &subs[0], &mut buf).unwrap();
            hint_black_box(&buf);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_splitter, bench_partition_hit_miss);
criterion_main!(benches);
