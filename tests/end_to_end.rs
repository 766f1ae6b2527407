//! Integration tests standing up a full [`HostCache`] over a temp-file
//! backing store and exercising the data path end to end: splitting,
//! hit/miss/fill, eviction, and the special opcodes.

use std::sync::atomic::{AtomicBool, Ordering};

use numa_block_cache::slot::{DirtyState, Identity};
use numa_block_cache::{
    special_ops, BackingStore, CacheConfig, CacheError, Command, FileBackingStore, HostCache, WriteMode,
};
use tempfile::NamedTempFile;

fn id(cb_id: u64) -> Identity {
    Identity {
        target: 0,
        lun: 0,
        cb_id,
    }
}

const B: u64 = 4096;

fn scratch_file(bytes: u64) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    file.as_file().set_len(bytes).unwrap();
    file
}

fn single_partition_host() -> HostCache {
    let config = CacheConfig::new(4 * B, B as u32).unwrap().with_cache_way(1).unwrap();
    HostCache::new(&config).unwrap()
}

#[test]
fn write_then_read_back_one_aligned_block() {
    let file = scratch_file(B);
    let store = FileBackingStore::open(file.path(), false).unwrap();
    let host = single_partition_host();

    let mut write_buf = vec![0xAAu8; B as usize];
    let cmd = Command::Write {
        target: 0,
        lun: 0,
        offset: 0,
        length: B,
    };
    numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut write_buf).unwrap();

    let mut read_buf = vec![0u8; B as usize];
    let cmd = Command::Read {
        target: 0,
        lun: 0,
        offset: 0,
        length: B,
    };
    numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut read_buf).unwrap();

    assert!(read_buf.iter().all(|&b| b == 0xAA));
    let mut on_disk = vec![0u8; B as usize];
    store.read_at(0, &mut on_disk).unwrap();
    assert!(on_disk.iter().all(|&b| b == 0xAA));
}

#[test]
fn two_block_read_miss_fills_both_and_orders_lru_most_recent_first() {
    let file = scratch_file(4 * B);
    let store = FileBackingStore::open(file.path(), false).unwrap();
    let host = single_partition_host();

    let mut buf = vec![0xFFu8; (2 * B) as usize];
    let cmd = Command::Read {
        target: 0,
        lun: 0,
        offset: 0,
        length: 2 * B,
    };
    numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut buf).unwrap();

    // Zero-initialized backing file: both fills should read back as zero.
    assert!(buf.iter().all(|&b| b == 0));

    let mut p = host.lock(host.partition_of(0));
    assert!(p.lookup(id(0)).is_some());
    assert!(p.lookup(id(1)).is_some());
    drop(p);
}

#[test]
fn unaligned_write_splits_into_three_sub_requests_with_exact_byte_boundaries() {
    let file = scratch_file(3 * B);
    let store = FileBackingStore::open(file.path(), false).unwrap();
    let host = single_partition_host();

    let offset = 100u64;
    let length = 8000u64;
    let mut write_buf = vec![0x5Au8; length as usize];
    let cmd = Command::Write {
        target: 0,
        lun: 0,
        offset,
        length,
    };
    numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut write_buf).unwrap();

    let mut whole = vec![0u8; (3 * B) as usize];
    store.read_at(0, &mut whole).unwrap();

    // Bytes [0, 100) untouched (still zero).
    assert!(whole[0..100].iter().all(|&b| b == 0));
    // Bytes [100, 100+8000) written.
    assert!(whole[100..100 + 8000].iter().all(|&b| b == 0x5A));
    // Remaining tail untouched.
    assert!(whole[100 + 8000..].iter().all(|&b| b == 0));
}

#[test]
fn compare_and_write_miscompare_reports_first_differing_offset_in_block_three() {
    let file = scratch_file(8 * B);
    let store = FileBackingStore::open(file.path(), false).unwrap();

    let pattern = vec![0x11u8; (8 * B) as usize];
    store.write_at(0, &pattern).unwrap();

    let mut compare = pattern.clone();
    compare[3 * B as usize + 17] = 0xFF;
    let write = vec![0x22u8; (8 * B) as usize];

    let err = special_ops::compare_and_write(&store, 0, &compare, &write).unwrap_err();
    match err {
        numa_block_cache::CacheError::Miscompare { offset } => {
            assert_eq!(offset, 3 * B + 17);
        }
        other => panic!("expected Miscompare, got {other:?}"),
    }

    let mut unchanged = vec![0u8; (8 * B) as usize];
    store.read_at(0, &mut unchanged).unwrap();
    assert_eq!(unchanged, pattern);
}

#[test]
fn fifth_distinct_block_evicts_the_first_inserted_block() {
    let file = scratch_file(5 * B);
    let store = FileBackingStore::open(file.path(), false).unwrap();
    let host = single_partition_host(); // nb = 4

    for cb in 0..5u64 {
        let mut buf = vec![(cb as u8).wrapping_add(1); B as usize];
        let cmd = Command::Read {
            target: 0,
            lun: 0,
            offset: cb * B,
            length: B,
        };
        numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut buf).unwrap();
    }

    let mut p = host.lock(host.partition_of(0));
    assert!(p.lookup(id(0)).is_none());
    for cb in 1..5u64 {
        assert!(p.lookup(id(cb)).is_some());
    }
}

#[test]
fn unmap_one_descriptor_on_thin_provisioned_lun_then_reads_zeros() {
    let file = scratch_file(4 * B);
    let store = FileBackingStore::open(file.path(), false).unwrap();
    store.write_at(0, &vec![0xEEu8; (4 * B) as usize]).unwrap();

    let descriptors = vec![special_ops::UnmapDescriptor {
        lba: 1,
        num_blocks: 2,
    }];
    special_ops::unmap(&store, &descriptors, B, true).unwrap();

    let mut buf = vec![0u8; (2 * B) as usize];
    store.read_at(B, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));

    // Block 0, untouched by the unmap, is unaffected.
    let mut first = vec![0u8; B as usize];
    store.read_at(0, &mut first).unwrap();
    assert!(first.iter().all(|&b| b == 0xEE));
}

/// Wraps a [`FileBackingStore`] and can be told to fail the next `read_at`
/// once, to exercise the miss-plus-eviction-plus-failing-fill path without
/// a dedicated in-memory mock.
struct FlakyStore {
    inner: FileBackingStore,
    fail_next_read: AtomicBool,
}

impl BackingStore for FlakyStore {
    fn size(&self) -> u64 {
        self.inner.size()
    }
    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> numa_block_cache::Result<()> {
        if self.fail_next_read.swap(false, Ordering::SeqCst) {
            return Err(CacheError::BackingRead {
                offset,
                source: std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
            });
        }
        self.inner.read_at(offset, buf)
    }
    fn write_at(&self, offset: u64, buf: &[u8]) -> numa_block_cache::Result<()> {
        self.inner.write_at(offset, buf)
    }
    fn sync(&self) -> numa_block_cache::Result<()> {
        self.inner.sync()
    }
    fn punch_hole(&self, offset: u64, len: u64) -> numa_block_cache::Result<()> {
        self.inner.punch_hole(offset, len)
    }
}

#[test]
fn failing_fill_on_eviction_does_not_orphan_the_evicted_slot() {
    let file = scratch_file(5 * B);
    let store = FlakyStore {
        inner: FileBackingStore::open(file.path(), false).unwrap(),
        fail_next_read: AtomicBool::new(false),
    };
    let host = single_partition_host(); // nb = 4

    for cb in 0..4u64 {
        let mut buf = vec![0u8; B as usize];
        let cmd = Command::Read {
            target: 0,
            lun: 0,
            offset: cb * B,
            length: B,
        };
        numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut buf).unwrap();
    }

    // The 5th distinct block forces eviction of block 0; inject a read
    // failure for the fill that follows the eviction.
    store.fail_next_read.store(true, Ordering::SeqCst);
    let mut buf = vec![0u8; B as usize];
    let cmd = Command::Read {
        target: 0,
        lun: 0,
        offset: 4 * B,
        length: B,
    };
    let err =
        numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut buf).unwrap_err();
    assert!(matches!(err, CacheError::BackingRead { .. }));

    // The evicted slot must be recoverable, not stuck outside every list.
    numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut buf).unwrap();
    let mut p = host.lock(host.partition_of(4));
    assert!(p.lookup(id(4)).is_some());
    drop(p);
}

#[test]
fn dirty_slot_is_never_evicted_and_cache_full_is_reported_instead() {
    let file = scratch_file(5 * B);
    let store = FileBackingStore::open(file.path(), false).unwrap();
    let host = single_partition_host(); // nb = 4

    for cb in 0..4u64 {
        let mut buf = vec![0u8; B as usize];
        let cmd = Command::Read {
            target: 0,
            lun: 0,
            offset: cb * B,
            length: B,
        };
        numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut buf).unwrap();
    }

    // Mark every slot dirty directly, as the write-back path would after a
    // WRITE, without going through an asynchronous flusher that could race
    // this test and clean a slot back up before the assertion below.
    {
        let mut p = host.lock(host.partition_of(0));
        for cb in 0..4u64 {
            let slot = p.lookup(id(cb)).unwrap();
            p.set_dirty_state(slot, DirtyState::Dirty);
        }
    }

    let mut buf = vec![0u8; B as usize];
    let cmd = Command::Read {
        target: 0,
        lun: 0,
        offset: 4 * B,
        length: B,
    };
    let err =
        numa_block_cache::dispatch(&host, &store, B, WriteMode::WriteThrough, None, &cmd, &mut buf).unwrap_err();
    assert!(matches!(err, CacheError::CacheFull));

    // Nothing was evicted: all four original blocks are still cached.
    let mut p = host.lock(host.partition_of(0));
    for cb in 0..4u64 {
        assert!(p.lookup(id(cb)).is_some());
    }
    drop(p);
}
