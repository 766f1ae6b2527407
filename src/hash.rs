//! Hash index mapping `(target, lun, cb_id)` to a slot within one partition.
//!
//! Bucket count equals the partition's slot count and the bucket function is
//! the same one the system this cache was ported from uses: `cb_id mod nb`.
//! Each bucket holds the head of a chain threaded through the slots'
//! `hash_next` links (see [`crate::slot::SlotArena`]); a lookup walks the
//! chain comparing the full identity tuple, since distinct LUNs and targets
//! can collide on the same `cb_id mod nb`.

use crate::slot::{Identity, SlotArena, SlotIndex};

/// Fixed-size bucket array for one partition's hash index.
#[derive(Debug)]
pub struct Index {
    buckets: Vec<SlotIndex>,
}

impl Index {
    /// Builds an index with `nb` buckets, all initially empty.
    pub fn new(nb: usize) -> Self {
        Index {
            buckets: vec![SlotIndex::NIL; nb],
        }
    }

    fn bucket_of(&self, cb_id: u64) -> usize {
        (cb_id as usize) % self.buckets.len()
    }

    /// Looks up a slot by identity. Pure; does not mutate LRU order.
    pub fn lookup(&self, arena: &SlotArena, identity: Identity) -> Option<SlotIndex> {
        let mut cur = self.buckets[self.bucket_of(identity.cb_id)];
        while !cur.is_nil() {
            let slot = arena.get(cur);
            if slot.identity() == Some(identity) {
                return Some(cur);
            }
            cur = arena.hash_next(cur);
        }
        None
    }

    /// Inserts `slot_idx` into the bucket for `identity`.
    ///
    /// Precondition: `slot_idx` is not currently linked into any bucket
    /// chain (its `hash_next` is whatever garbage it had as a free slot;
    /// this call overwrites it).
    pub fn insert(&mut self, arena: &mut SlotArena, identity: Identity, slot_idx: SlotIndex) {
        let bucket = self.bucket_of(identity.cb_id);
        let head = self.buckets[bucket];
        arena.set_hash_next(slot_idx, head);
        self.buckets[bucket] = slot_idx;
    }

    /// Removes `slot_idx` from the bucket chain for `identity`, if present.
    pub fn remove(&mut self, arena: &mut SlotArena, identity: Identity, slot_idx: SlotIndex) {
        let bucket = self.bucket_of(identity.cb_id);
        let mut cur = self.buckets[bucket];
        if cur == slot_idx {
            self.buckets[bucket] = arena.hash_next(slot_idx);
            arena.set_hash_next(slot_idx, SlotIndex::NIL);
            return;
        }
        while !cur.is_nil() {
            let next = arena.hash_next(cur);
            if next == slot_idx {
                let after = arena.hash_next(slot_idx);
                arena.set_hash_next(cur, after);
                arena.set_hash_next(slot_idx, SlotIndex::NIL);
                return;
            }
            cur = next;
        }
    }
}
