//! Per-LUN dirty queue and flusher thread for write-back mode.
//!
//! Grounded on `bs_thread.h`'s per-node `pending_cond`/`pending_lock`/
//! `pending_list` plus a `stop` flag, adapted here from per-node command
//! dispatch to a per-LUN dirty-slot queue drained by one dedicated thread,
//! using `std::sync::{Mutex, Condvar}` in place of the original's raw
//! pthread primitives.
//!
//! Dirty-slot membership is tracked by this module's own `VecDeque<DirtyItem>`
//! rather than a fourth intrusive link field on `Slot`: a slot's identity is
//! already carried in `DirtyItem`, so `flush_one` can detect a stale entry
//! (the slot was evicted or re-admitted before the flusher reached it) without
//! needing to walk a per-slot chain back to its owning queue.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::backing_store::BackingStore;
use crate::host_cache::HostCache;
use crate::slot::{DirtyState, Identity, SlotIndex};

/// A slot that was written under write-back mode and still needs flushing.
#[derive(Debug, Clone, Copy)]
pub struct DirtyItem {
    /// Partition owning the slot.
    pub partition_id: usize,
    /// Slot index within that partition.
    pub slot: SlotIndex,
    /// Identity the slot held when it was enqueued; used to detect eviction
    /// or re-use before the flush runs.
    pub identity: Identity,
}

struct Inner {
    items: Mutex<VecDeque<DirtyItem>>,
    cond: Condvar,
    stop: Mutex<bool>,
}

/// A per-LUN FIFO of slots awaiting a write-back flush.
#[derive(Clone)]
pub struct DirtyQueue {
    inner: Arc<Inner>,
}

impl DirtyQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        DirtyQueue {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
                stop: Mutex::new(false),
            }),
        }
    }

    /// Enqueues a dirty slot for the flusher thread to pick up.
    pub fn push(&self, item: DirtyItem) {
        let mut items = self.inner.items.lock().unwrap();
        items.push_back(item);
        self.inner.cond.notify_one();
    }

    /// Blocks until an item is available or the queue is told to stop, in
    /// which case it drains whatever remains before returning `None`.
    fn pop_blocking(&self) -> Option<DirtyItem> {
        let mut items = self.inner.items.lock().unwrap();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if *self.inner.stop.lock().unwrap() {
                return None;
            }
            items = self.inner.cond.wait(items).unwrap();
        }
    }

    /// Signals the flusher thread to drain the queue and exit.
    pub fn request_stop(&self) {
        *self.inner.stop.lock().unwrap() = true;
        self.inner.cond.notify_all();
    }
}

impl Default for DirtyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DirtyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.inner.items.lock().unwrap().len();
        f.debug_struct("DirtyQueue").field("len", &len).finish()
    }
}

/// Flushes one dirty slot to `store`, unless it was invalidated or already
/// flushed by something else before the write-back thread got to it.
fn flush_one(host: &HostCache, store: &dyn BackingStore, item: DirtyItem) {
    let block_size = {
        let partition = host.lock(item.partition_id);
        partition.block_size() as u64
    };
    let bytes = {
        let mut partition = host.lock(item.partition_id);
        if partition.identity_of(item.slot) != Some(item.identity) {
            return;
        }
        if partition.dirty_state(item.slot) != DirtyState::Dirty {
            return;
        }
        partition.set_dirty_state(item.slot, DirtyState::InFlight);
        partition.block_bytes(item.slot).to_vec()
    };

    let offset = item.identity.cb_id * block_size;
    let result = store.write_at(offset, &bytes);

    let mut partition = host.lock(item.partition_id);
    if partition.identity_of(item.slot) != Some(item.identity) {
        return;
    }
    match result {
        Ok(()) => {
            partition.set_dirty_state(item.slot, DirtyState::Clean);
            host.metrics().record_write_back();
        }
        Err(e) => {
            warn!("write-back flush failed for {:?}: {e}", item.identity);
            partition.set_dirty_state(item.slot, DirtyState::Dirty);
            host.metrics().record_write_back_failure();
        }
    }
}

/// A background thread draining one LUN's [`DirtyQueue`].
pub struct Flusher {
    queue: DirtyQueue,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Spawns the flusher thread. `host` and `store` must outlive it, hence
    /// the `'static` + `Arc` bounds.
    pub fn spawn(host: Arc<HostCache>, store: Arc<dyn BackingStore>, queue: DirtyQueue) -> Self {
        let thread_queue = queue.clone();
        let handle = thread::spawn(move || {
            debug!("write-back flusher started");
            while let Some(item) = thread_queue.pop_blocking() {
                flush_one(&host, store.as_ref(), item);
            }
            debug!("write-back flusher exiting");
        });
        Flusher {
            queue,
            handle: Some(handle),
        }
    }

    /// Signals the flusher to drain and join it.
    pub fn shutdown(mut self) {
        self.queue.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.queue.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl fmt::Debug for Flusher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flusher").field("queue", &self.queue).finish()
    }
}

/// Identifies a LUN for the purposes of routing dirty slots to its flusher.
pub type LunKey = (u32, u32);

/// Owns one [`DirtyQueue`]/[`Flusher`] pair per LUN, created lazily on that
/// LUN's first write-back write. Mirrors `bs_thread_info`'s per-node
/// `pending_list` array, except keyed by LUN instead of a fixed-size node
/// array, since the number of LUNs isn't known up front.
pub struct WritebackRegistry {
    host: Arc<HostCache>,
    store: Arc<dyn BackingStore>,
    luns: Mutex<HashMap<LunKey, (DirtyQueue, Flusher)>>,
}

impl WritebackRegistry {
    /// Creates a registry that will flush dirty slots for `host` against
    /// `store`. One registry is shared by every LUN serviced by this host
    /// cache; each LUN gets its own queue and flusher thread on demand.
    pub fn new(host: Arc<HostCache>, store: Arc<dyn BackingStore>) -> Self {
        WritebackRegistry {
            host,
            store,
            luns: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueues a dirty slot for `lun`'s flusher, spawning that flusher on
    /// the LUN's first write-back write.
    pub fn enqueue(&self, lun: LunKey, item: DirtyItem) {
        let mut luns = self.luns.lock().unwrap();
        let (queue, _flusher) = luns.entry(lun).or_insert_with(|| {
            debug!("spawning write-back flusher for lun {lun:?}");
            let queue = DirtyQueue::new();
            let flusher = Flusher::spawn(self.host.clone(), self.store.clone(), queue.clone());
            (queue, flusher)
        });
        queue.push(item);
    }

    /// Signals every LUN's flusher to drain its queue and exit, and waits
    /// for all of them to finish.
    pub fn shutdown(&self) {
        let mut luns = self.luns.lock().unwrap();
        for (_, (_, flusher)) in luns.drain() {
            flusher.shutdown();
        }
    }
}

impl fmt::Debug for WritebackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lun_count = self.luns.lock().unwrap().len();
        f.debug_struct("WritebackRegistry")
            .field("luns", &lun_count)
            .finish()
    }
}

impl Drop for WritebackRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
