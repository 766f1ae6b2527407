//! The cache-block slot arena.
//!
//! Unlike a generic associative cache, which allocates one heap node per
//! inserted key, a block cache partition preallocates a fixed number of
//! slots once at startup and recycles them forever: `nb = buffer_size / cbs`
//! slots, each covering a fixed-stride region of the partition's pinned
//! buffer. A slot's membership in the free list, the LRU list, and (through
//! [`crate::hash::Index`]) a hash bucket chain is tracked by indices into
//! this arena rather than raw pointers, since the arena itself owns every
//! slot for the partition's entire lifetime.

use std::fmt;

/// Index of a slot within its partition's arena. `NIL` terminates a link.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotIndex(u32);

impl SlotIndex {
    /// The null link, used to terminate free/LRU/hash chains.
    pub const NIL: SlotIndex = SlotIndex(u32::MAX);

    /// Wraps a raw arena index.
    pub fn new(i: usize) -> Self {
        debug_assert!(i < u32::MAX as usize, "slot arenas are capped below u32::MAX");
        SlotIndex(i as u32)
    }

    /// Whether this is the null link.
    pub fn is_nil(self) -> bool {
        self == SlotIndex::NIL
    }

    /// The index as a `usize` for arena indexing. Panics on `NIL`.
    pub fn index(self) -> usize {
        assert!(!self.is_nil(), "dereferenced a nil slot index");
        self.0 as usize
    }
}

impl fmt::Debug for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            f.write_str("SlotIndex(nil)")
        } else {
            write!(f, "SlotIndex({})", self.0)
        }
    }
}

/// Identity of the cache block a slot currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    /// SCSI target id the LUN belongs to.
    pub target: u32,
    /// Logical unit number.
    pub lun: u32,
    /// Cache-block id: `file_offset / block_size`.
    pub cb_id: u64,
}

/// Write state of a slot's contents relative to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// Slot contents match the backing store (or the slot is invalid).
    Clean,
    /// Slot contents have been written but not yet flushed.
    Dirty,
    /// A flusher thread is currently writing this slot back.
    InFlight,
}

/// One cache-block slot: metadata plus intrusive links into the free list,
/// the LRU list, and a hash bucket chain. Dirty-slot membership for
/// write-back is tracked out of line by [`crate::writeback::DirtyQueue`]
/// rather than a fourth per-slot link field; see that module's doc comment.
#[derive(Debug)]
pub struct Slot {
    identity: Option<Identity>,
    dirty: DirtyState,
    hit_count: u64,
    /// Byte offset of this slot's block within the partition's pinned buffer.
    pub buf_offset: usize,
    hash_next: SlotIndex,
    lru_prev: SlotIndex,
    lru_next: SlotIndex,
}

impl Slot {
    fn new(buf_offset: usize) -> Self {
        Slot {
            identity: None,
            dirty: DirtyState::Clean,
            hit_count: 0,
            buf_offset,
            hash_next: SlotIndex::NIL,
            lru_prev: SlotIndex::NIL,
            lru_next: SlotIndex::NIL,
        }
    }

    /// Whether the slot currently holds a valid cache block.
    pub fn is_valid(&self) -> bool {
        self.identity.is_some()
    }

    /// The identity this slot holds, if valid.
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    /// Current dirty state.
    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    /// Sets the dirty state.
    pub fn set_dirty_state(&mut self, state: DirtyState) {
        self.dirty = state;
    }

    /// Number of hits recorded since this slot was last admitted.
    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }
}

/// The fixed-size pool of slots belonging to one partition, plus the raw
/// links implementing its free list, LRU list, and dirty list. Hash bucket
/// chains are implemented here too (`hash_next`) but owned logically by
/// [`crate::hash::Index`], which is the only code that mutates them.
#[derive(Debug)]
pub struct SlotArena {
    slots: Vec<Slot>,
}

impl SlotArena {
    /// Builds an arena of `nb` slots whose buffers are laid out at stride
    /// `block_size` starting at offset 0 of the partition buffer.
    pub fn new(nb: usize, block_size: usize) -> Self {
        let slots = (0..nb).map(|i| Slot::new(i * block_size)).collect();
        SlotArena { slots }
    }

    /// Number of slots in this arena.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the arena has no slots (a construction-time error; a live
    /// partition never has an empty arena).
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Immutable slot access.
    pub fn get(&self, idx: SlotIndex) -> &Slot {
        &self.slots[idx.index()]
    }

    /// Mutable slot access.
    pub fn get_mut(&mut self, idx: SlotIndex) -> &mut Slot {
        &mut self.slots[idx.index()]
    }

    /// Publishes an identity into a slot, as part of admission.
    pub fn set_identity(&mut self, idx: SlotIndex, identity: Option<Identity>) {
        let slot = self.get_mut(idx);
        slot.identity = identity;
        slot.hit_count = if identity.is_some() { 1 } else { 0 };
        slot.dirty = DirtyState::Clean;
    }

    /// Increments the slot's hit counter. Called on every hit or fill.
    pub fn record_hit(&mut self, idx: SlotIndex) {
        self.get_mut(idx).hit_count += 1;
    }

    // --- free list: singly linked via `hash_next`-adjacent `lru_next`,
    // reused for the free chain since a free slot is never simultaneously
    // in the LRU list. ---

    /// Detaches `idx` from whatever free-list position it occupies and
    /// clears its free-link field. Used by the arena owner (`Partition`)
    /// which tracks the free-list head itself.
    pub fn free_next(&self, idx: SlotIndex) -> SlotIndex {
        self.get(idx).lru_next
    }

    /// Sets the free-list successor link for `idx`.
    pub fn set_free_next(&mut self, idx: SlotIndex, next: SlotIndex) {
        self.get_mut(idx).lru_next = next;
    }

    // --- LRU doubly linked list ---

    /// Previous (more-recently-used) neighbor.
    pub fn lru_prev(&self, idx: SlotIndex) -> SlotIndex {
        self.get(idx).lru_prev
    }

    /// Next (less-recently-used) neighbor.
    pub fn lru_next(&self, idx: SlotIndex) -> SlotIndex {
        self.get(idx).lru_next
    }

    /// Sets both LRU link fields directly; used by the list maintenance
    /// code in `partition.rs`, which owns head/tail pointers.
    pub fn set_lru_links(&mut self, idx: SlotIndex, prev: SlotIndex, next: SlotIndex) {
        let slot = self.get_mut(idx);
        slot.lru_prev = prev;
        slot.lru_next = next;
    }

    // --- hash bucket chain ---

    /// Next slot in this slot's hash bucket chain.
    pub fn hash_next(&self, idx: SlotIndex) -> SlotIndex {
        self.get(idx).hash_next
    }

    /// Sets this slot's hash bucket chain successor.
    pub fn set_hash_next(&mut self, idx: SlotIndex, next: SlotIndex) {
        self.get_mut(idx).hash_next = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_invalid_with_strided_offsets() {
        let arena = SlotArena::new(4, 4096);
        assert_eq!(arena.len(), 4);
        for i in 0..4 {
            let slot = arena.get(SlotIndex::new(i));
            assert!(!slot.is_valid());
            assert_eq!(slot.buf_offset, i * 4096);
        }
    }

    #[test]
    fn set_identity_resets_hit_count_and_dirty_state() {
        let mut arena = SlotArena::new(2, 4096);
        let idx = SlotIndex::new(0);
        arena.set_identity(
            idx,
            Some(Identity {
                target: 0,
                lun: 0,
                cb_id: 7,
            }),
        );
        assert!(arena.get(idx).is_valid());
        assert_eq!(arena.get(idx).hit_count(), 1);
        arena.record_hit(idx);
        assert_eq!(arena.get(idx).hit_count(), 2);
    }

    #[test]
    #[should_panic]
    fn nil_index_cannot_be_dereferenced() {
        let arena = SlotArena::new(1, 4096);
        let _ = arena.get(SlotIndex::NIL);
    }
}
