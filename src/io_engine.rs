//! Per-sub-request hit/miss/fill state machine.
//!
//! Grounded directly on the `#ifdef NUMA_CACHE` branches in `bs_rdwr.c`:
//! lock the owning partition, look the block up, on a hit copy bytes and
//! touch the LRU entry, on a miss admit a slot, fill it from the backing
//! store, copy bytes, and publish the new identity — all under one critical
//! section, the same way the original C does it under one `pthread_mutex`.

use log::trace;

use crate::backing_store::BackingStore;
use crate::config::WriteMode;
use crate::error::Result;
use crate::host_cache::HostCache;
use crate::slot::DirtyState;
use crate::splitter::SubRequest;
use crate::writeback::{DirtyItem, WritebackRegistry};

/// Services a READ sub-request: copies bytes from the cache into `cmd_buf`,
/// filling the owning slot from `store` first on a miss.
pub fn service_read(host: &HostCache, store: &dyn BackingStore, sub: &SubRequest, cmd_buf: &mut [u8]) -> Result<()> {
    let mut partition = host.lock(sub.partition_id);
    let dest_range = sub.buf_offset as usize..(sub.buf_offset as usize + sub.length as usize);
    let in_block = sub.in_block_offset as usize..(sub.in_block_offset as usize + sub.length as usize);

    if let Some(slot) = partition.lookup(sub.identity) {
        trace!("read hit: {:?}", sub.identity);
        cmd_buf[dest_range].copy_from_slice(&partition.block_bytes(slot)[in_block]);
        partition.touch(slot);
        host.metrics().record_read(true);
        return Ok(());
    }

    trace!("read miss: {:?}", sub.identity);
    let (slot, evicted) = partition.admit()?;
    if evicted {
        host.metrics().record_eviction();
    }
    if let Err(e) = store.read_at(sub.block_offset, partition.block_bytes_mut(slot)) {
        partition.release_unpublished(slot);
        return Err(e);
    }
    cmd_buf[dest_range].copy_from_slice(&partition.block_bytes(slot)[in_block]);
    partition.publish(slot, sub.identity);
    host.metrics().record_read(false);
    host.metrics().record_fill();
    Ok(())
}

/// Services a WRITE sub-request: applies `cmd_buf`'s bytes to the owning
/// slot (filling it from `store` first on a miss) and, under
/// [`WriteMode::WriteThrough`], flushes the full block back immediately.
/// Under [`WriteMode::WriteBack`] the slot is only marked dirty and handed to
/// `writeback`'s per-LUN flusher, which drains it asynchronously; `writeback`
/// must be `Some` whenever `write_mode` is [`WriteMode::WriteBack`].
pub fn service_write(
    host: &HostCache,
    store: &dyn BackingStore,
    sub: &SubRequest,
    cmd_buf: &[u8],
    write_mode: WriteMode,
    writeback: Option<&WritebackRegistry>,
) -> Result<()> {
    let mut partition = host.lock(sub.partition_id);
    let src_range = sub.buf_offset as usize..(sub.buf_offset as usize + sub.length as usize);
    let in_block = sub.in_block_offset as usize..(sub.in_block_offset as usize + sub.length as usize);

    let (slot, was_hit) = match partition.lookup(sub.identity) {
        Some(slot) => {
            trace!("write hit: {:?}", sub.identity);
            (slot, true)
        }
        None => {
            trace!("write miss: {:?}", sub.identity);
            let (slot, evicted) = partition.admit()?;
            if evicted {
                host.metrics().record_eviction();
            }
            if let Err(e) = store.read_at(sub.block_offset, partition.block_bytes_mut(slot)) {
                partition.release_unpublished(slot);
                return Err(e);
            }
            host.metrics().record_fill();
            (slot, false)
        }
    };
    host.metrics().record_write(was_hit);

    partition.block_bytes_mut(slot)[in_block].copy_from_slice(&cmd_buf[src_range]);

    match write_mode {
        WriteMode::WriteThrough => {
            let bytes = partition.block_bytes(slot).to_vec();
            if let Err(e) = store.write_at(sub.block_offset, &bytes) {
                if !was_hit {
                    // Never published: the admitted slot holds no durable
                    // contents yet, so it goes back to the free list rather
                    // than being left reachable by neither list nor lookup.
                    partition.release_unpublished(slot);
                }
                return Err(e);
            }
            partition.set_dirty_state(slot, DirtyState::Clean);
        }
        WriteMode::WriteBack => {
            partition.set_dirty_state(slot, DirtyState::Dirty);
        }
    }

    if was_hit {
        partition.touch(slot);
    } else {
        partition.publish(slot, sub.identity);
    }

    if write_mode == WriteMode::WriteBack {
        let registry = writeback.expect("WriteMode::WriteBack requires a WritebackRegistry");
        registry.enqueue(
            (sub.identity.target, sub.identity.lun),
            DirtyItem {
                partition_id: sub.partition_id,
                slot,
                identity: sub.identity,
            },
        );
    }
    Ok(())
}
