//! A single NUMA-pinned cache partition: buffer, slot arena, hash index,
//! free list and LRU list, all guarded by one mutex.
//!
//! This is the arena-based counterpart of the segmented LRU cache this crate
//! grew out of: where that design shards a generic key space across
//! `Mutex<LruSegment<K, V>>` segments and grows each segment's list nodes on
//! demand, a partition here owns a *fixed* slot pool assigned once at
//! construction and replaces entries in place forever.

use std::fmt;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::error::{CacheError, Result};
use crate::hash::Index;
use crate::numa::Topology;
use crate::slot::{DirtyState, Identity, SlotArena, SlotIndex};

/// One NUMA-pinned cache partition.
pub struct Partition {
    node: usize,
    block_size: usize,
    buffer: Vec<u8>,
    arena: SlotArena,
    index: Index,
    free_head: SlotIndex,
    lru_head: SlotIndex,
    lru_tail: SlotIndex,
}

impl Partition {
    /// Builds a partition of `buffer_size` bytes split into `block_size`
    /// byte slots, pinned to `node`. All-or-nothing: any allocation or
    /// pinning failure propagates and leaves nothing constructed.
    pub fn new(topology: &Topology, node: usize, buffer_size: usize, block_size: usize) -> Result<Self> {
        if block_size == 0 || buffer_size % block_size != 0 {
            return Err(CacheError::Config(format!(
                "buffer_size {buffer_size} is not a multiple of block_size {block_size}"
            )));
        }
        let nb = buffer_size / block_size;
        if nb == 0 {
            return Err(CacheError::Config(
                "partition would have zero slots".to_string(),
            ));
        }

        topology.pin_current_thread(node)?;
        let buffer = crate::numa::allocate_pinned(buffer_size)?;

        let mut arena = SlotArena::new(nb, block_size);
        let index = Index::new(nb);

        // Thread every slot onto the free list, tail to head, so slot 0
        // ends up at the free-list head (matching admission order in the
        // original source's `alloc_nc`, which appends to the tail of an
        // initially empty list walked head-first).
        let mut free_head = SlotIndex::NIL;
        for i in (0..nb).rev() {
            let idx = SlotIndex::new(i);
            arena.set_free_next(idx, free_head);
            free_head = idx;
        }

        debug!("partition on node {node}: {nb} slots of {block_size} bytes");

        Ok(Partition {
            node,
            block_size,
            buffer,
            arena,
            index,
            free_head,
            lru_head: SlotIndex::NIL,
            lru_tail: SlotIndex::NIL,
        })
    }

    /// The NUMA node this partition is pinned to.
    pub fn node(&self) -> usize {
        self.node
    }

    /// Number of slots in this partition.
    pub fn slot_count(&self) -> usize {
        self.arena.len()
    }

    /// Cache-block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Looks up a slot by identity without mutating list order.
    pub fn lookup(&self, identity: Identity) -> Option<SlotIndex> {
        self.index.lookup(&self.arena, identity)
    }

    /// Read-only view of a slot's backing bytes.
    pub fn block_bytes(&self, idx: SlotIndex) -> &[u8] {
        let off = self.arena.get(idx).buf_offset;
        &self.buffer[off..off + self.block_size]
    }

    /// Mutable view of a slot's backing bytes.
    pub fn block_bytes_mut(&mut self, idx: SlotIndex) -> &mut [u8] {
        let off = self.arena.get(idx).buf_offset;
        &mut self.buffer[off..off + self.block_size]
    }

    /// Current dirty state of a slot.
    pub fn dirty_state(&self, idx: SlotIndex) -> DirtyState {
        self.arena.get(idx).dirty_state()
    }

    /// Sets a slot's dirty state.
    pub fn set_dirty_state(&mut self, idx: SlotIndex, state: DirtyState) {
        self.arena.get_mut(idx).set_dirty_state(state);
    }

    /// Identity currently held by a slot, if any.
    pub fn identity_of(&self, idx: SlotIndex) -> Option<Identity> {
        self.arena.get(idx).identity()
    }

    /// Obtains a slot to hold a new identity: the free list if non-empty,
    /// else the least-recently-used *clean* slot (evicting it). The returned
    /// flag is `true` when a live slot was evicted rather than taken from the
    /// free list. A slot holding an unflushed write or one mid-flush may never
    /// be evicted, so this walks the LRU list from the tail toward the head
    /// for the first clean candidate; if every slot is dirty or in-flight,
    /// returns [`CacheError::CacheFull`] rather than destroying an unflushed
    /// write. The returned slot always has `validity=INVALID` and
    /// `hit_count=0`, whether or not the caller goes on to successfully fill
    /// and publish it.
    pub fn admit(&mut self) -> Result<(SlotIndex, bool)> {
        debug_assert!(self.arena.len() > 0, "admit called on an empty partition");

        if !self.free_head.is_nil() {
            let idx = self.free_head;
            self.free_head = self.arena.free_next(idx);
            self.arena.set_free_next(idx, SlotIndex::NIL);
            trace!("admit: took free slot {idx:?}");
            return Ok((idx, false));
        }

        let mut candidate = self.lru_tail;
        while !candidate.is_nil() && self.arena.get(candidate).dirty_state() != DirtyState::Clean {
            candidate = self.arena.lru_prev(candidate);
        }
        if candidate.is_nil() {
            debug!("admit: no clean victim available, partition exhausted");
            return Err(CacheError::CacheFull);
        }

        let victim = candidate;
        if let Some(identity) = self.arena.get(victim).identity() {
            self.index.remove(&mut self.arena, identity, victim);
        }
        self.lru_unlink(victim);
        self.arena.set_identity(victim, None);
        debug!("admit: evicted slot {victim:?}");
        Ok((victim, true))
    }

    /// Returns a slot that [`Partition::admit`] handed out but was never
    /// published, back to the free list. Used when a backing-store fill
    /// fails between `admit` and `publish` so the slot isn't permanently
    /// orphaned outside every list.
    pub fn release_unpublished(&mut self, idx: SlotIndex) {
        debug_assert!(
            !self.arena.get(idx).is_valid(),
            "release_unpublished called on a published slot"
        );
        self.arena.set_free_next(idx, self.free_head);
        self.free_head = idx;
    }

    /// Moves a slot to the LRU head. Called on every hit or fill.
    pub fn touch(&mut self, idx: SlotIndex) {
        if self.lru_head == idx {
            return;
        }
        self.lru_unlink(idx);
        self.lru_push_front(idx);
        self.arena.record_hit(idx);
    }

    /// Writes identity into a just-admitted slot, inserts it into the hash
    /// index, and places it at the LRU head.
    pub fn publish(&mut self, idx: SlotIndex, identity: Identity) {
        self.arena.set_identity(idx, Some(identity));
        self.index.insert(&mut self.arena, identity, idx);
        self.lru_push_front(idx);
        trace!("publish: slot {idx:?} now holds {identity:?}");
    }

    /// Removes `identity` from the cache if present, returning it to the
    /// free list.
    pub fn invalidate(&mut self, identity: Identity) {
        let Some(idx) = self.index.lookup(&self.arena, identity) else {
            return;
        };
        self.index.remove(&mut self.arena, identity, idx);
        self.lru_unlink(idx);
        self.arena.set_identity(idx, None);
        self.arena.set_free_next(idx, self.free_head);
        self.free_head = idx;
    }

    fn lru_push_front(&mut self, idx: SlotIndex) {
        let old_head = self.lru_head;
        self.arena.set_lru_links(idx, SlotIndex::NIL, old_head);
        if !old_head.is_nil() {
            let old_head_next = self.arena.lru_next(old_head);
            self.arena.set_lru_links(old_head, idx, old_head_next);
        }
        self.lru_head = idx;
        if self.lru_tail.is_nil() {
            self.lru_tail = idx;
        }
    }

    fn lru_unlink(&mut self, idx: SlotIndex) {
        let prev = self.arena.lru_prev(idx);
        let next = self.arena.lru_next(idx);
        if !prev.is_nil() {
            let prev_prev = self.arena.lru_prev(prev);
            self.arena.set_lru_links(prev, prev_prev, next);
        } else if self.lru_head == idx {
            self.lru_head = next;
        }
        if !next.is_nil() {
            let next_next = self.arena.lru_next(next);
            self.arena.set_lru_links(next, prev, next_next);
        } else if self.lru_tail == idx {
            self.lru_tail = prev;
        }
        self.arena.set_lru_links(idx, SlotIndex::NIL, SlotIndex::NIL);
    }
}

/// A partition guarded by its own lock, as stored in [`crate::host_cache::HostCache`].
pub type GuardedPartition = Mutex<Partition>;

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("node", &self.node)
            .field("block_size", &self.block_size)
            .field("slot_count", &self.arena.len())
            .field("buffer_bytes", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(cb_id: u64) -> Identity {
        Identity {
            target: 0,
            lun: 0,
            cb_id,
        }
    }

    fn fresh(nb: usize, block_size: usize) -> Partition {
        let topo = Topology::discover();
        Partition::new(&topo, 0, nb * block_size, block_size).unwrap()
    }

    #[test]
    fn admit_drains_free_list_before_evicting() {
        let mut p = fresh(2, 4096);
        let (a, evicted_a) = p.admit().unwrap();
        p.publish(a, id(0));
        let (b, evicted_b) = p.admit().unwrap();
        p.publish(b, id(1));
        assert_ne!(a, b);
        assert!(!evicted_a && !evicted_b);
        assert_eq!(p.lookup(id(0)), Some(a));
        assert_eq!(p.lookup(id(1)), Some(b));
    }

    #[test]
    fn admit_evicts_lru_tail_when_full() {
        let mut p = fresh(2, 4096);
        let (a, _) = p.admit().unwrap();
        p.publish(a, id(0));
        let (b, _) = p.admit().unwrap();
        p.publish(b, id(1));
        // a is now LRU (least recently touched); admitting again evicts it.
        let (c, evicted) = p.admit().unwrap();
        assert_eq!(c, a);
        assert!(evicted);
        p.publish(c, id(2));
        assert_eq!(p.lookup(id(0)), None);
        assert_eq!(p.lookup(id(1)), Some(b));
        assert_eq!(p.lookup(id(2)), Some(c));
    }

    #[test]
    fn admit_clears_evicted_slot_identity_and_hit_count_before_publish() {
        let mut p = fresh(1, 4096);
        let (a, _) = p.admit().unwrap();
        p.publish(a, id(0));
        assert_eq!(p.arena.get(a).hit_count(), 1);

        // Evict without ever publishing the replacement: the victim must
        // already report INVALID/hit_count==0, not just after publish().
        let (victim, evicted) = p.admit().unwrap();
        assert_eq!(victim, a);
        assert!(evicted);
        assert!(!p.arena.get(victim).is_valid());
        assert_eq!(p.arena.get(victim).hit_count(), 0);
        assert_eq!(p.lookup(id(0)), None);
    }

    #[test]
    fn touch_protects_from_eviction() {
        let mut p = fresh(2, 4096);
        let (a, _) = p.admit().unwrap();
        p.publish(a, id(0));
        let (b, _) = p.admit().unwrap();
        p.publish(b, id(1));
        p.touch(a);
        // b is now LRU tail, not a.
        let (c, _) = p.admit().unwrap();
        assert_eq!(c, b);
    }

    #[test]
    fn invalidate_returns_slot_to_free_list() {
        let mut p = fresh(1, 4096);
        let (a, _) = p.admit().unwrap();
        p.publish(a, id(0));
        p.invalidate(id(0));
        assert_eq!(p.lookup(id(0)), None);
        let (b, _) = p.admit().unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn release_unpublished_makes_slot_available_again() {
        let mut p = fresh(1, 4096);
        let (a, _) = p.admit().unwrap();
        // Simulate a fill failure between admit() and publish(): the caller
        // never publishes `a` and instead releases it back to the cache.
        p.release_unpublished(a);
        let (b, _) = p.admit().unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn admit_skips_dirty_and_in_flight_victims() {
        let mut p = fresh(2, 4096);
        let (a, _) = p.admit().unwrap();
        p.publish(a, id(0));
        let (b, _) = p.admit().unwrap();
        p.publish(b, id(1));
        // `a` is the LRU tail, but it is dirty (unflushed write-back) and
        // must not be evicted; `b` is clean and becomes the victim instead,
        // even though it is more recently used.
        p.set_dirty_state(a, DirtyState::Dirty);
        let (victim, evicted) = p.admit().unwrap();
        assert_eq!(victim, b);
        assert!(evicted);
        assert_eq!(p.lookup(id(0)), Some(a));
        assert_eq!(p.lookup(id(1)), None);
    }

    #[test]
    fn admit_reports_cache_full_when_every_slot_is_dirty_or_in_flight() {
        let mut p = fresh(2, 4096);
        let (a, _) = p.admit().unwrap();
        p.publish(a, id(0));
        let (b, _) = p.admit().unwrap();
        p.publish(b, id(1));
        p.set_dirty_state(a, DirtyState::Dirty);
        p.set_dirty_state(b, DirtyState::InFlight);

        let err = p.admit().unwrap_err();
        assert!(matches!(err, CacheError::CacheFull));
        // Nothing was evicted: both identities are still present.
        assert_eq!(p.lookup(id(0)), Some(a));
        assert_eq!(p.lookup(id(1)), Some(b));
    }

    #[test]
    fn block_size_zero_is_rejected() {
        let topo = Topology::discover();
        assert!(Partition::new(&topo, 0, 4096, 0).is_err());
    }

    #[test]
    fn misaligned_buffer_size_is_rejected() {
        let topo = Topology::discover();
        assert!(Partition::new(&topo, 0, 4097, 4096).is_err());
    }
}
