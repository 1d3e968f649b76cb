//! Entity identifiers and allocation.
//!
//! An [`EntityId`] is a 32-bit handle that packs a 22-bit *index* in the low
//! bits and an 8-bit *generation* above it. The generation is bumped every
//! time an index is destroyed, which allows immediate stale-ID detection.
//!
//! Destroyed indices go to the back of a FIFO free list and are only handed
//! out again once more than [`MINIMUM_FREE_INDICES`] of them are waiting. A
//! freshly destroyed slot therefore sits out at least that many creations
//! before it can be reassigned.
//!
//! The generation is only 8 bits wide and wraps. After 256 reuses of the same
//! slot an ancient id aliases a live one. With the default watermark a single
//! slot is reused at most once per ~1024 destroys, so aliasing requires a
//! stale id to be held across roughly a quarter million destroys.

use std::collections::VecDeque;
use std::fmt;

use crate::EcsError;

/// Number of bits used for the slot index.
pub const INDEX_BITS: u32 = 22;
/// Number of bits used for the generation counter.
pub const GENERATION_BITS: u32 = 8;
/// Largest addressable slot index.
pub const MAX_INDEX: u32 = (1 << INDEX_BITS) - 1;
/// Default deferred-reuse watermark for the free list.
pub const MINIMUM_FREE_INDICES: usize = 1024;

const INDEX_MASK: u32 = MAX_INDEX;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[unused: 2 | generation: 8 | index: 22]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    /// An id that is never alive. Its index is out of range of every manager.
    pub const NULL: EntityId = EntityId(u32::MAX);

    /// Construct an `EntityId` from an index and generation.
    ///
    /// Bits of `index` above [`INDEX_BITS`] are discarded.
    #[inline]
    pub const fn new(index: u32, generation: u8) -> Self {
        Self(((generation as u32) << INDEX_BITS) | (index & INDEX_MASK))
    }

    /// The index portion (low 22 bits).
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// The generation portion (next 8 bits).
    #[inline]
    pub const fn generation(self) -> u8 {
        ((self.0 >> INDEX_BITS) & GENERATION_MASK) as u8
    }

    /// Raw `u32` representation.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Reconstruct from a raw `u32`.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Whether this is [`EntityId::NULL`].
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("EntityId(null)");
        }
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityManager
// ---------------------------------------------------------------------------

/// Allocates and recycles [`EntityId`]s with generational tracking.
///
/// An id is alive iff the generation stored for its index equals the
/// generation encoded in the id. The manager keeps no separate alive flags:
/// destroying bumps the generation, which kills every outstanding copy.
#[derive(Debug)]
pub struct EntityManager {
    /// Current generation for each index slot.
    generations: Vec<u8>,
    /// Destroyed indices waiting for reuse (FIFO).
    free_indices: VecDeque<u32>,
    /// Reuse only starts once `free_indices.len()` exceeds this.
    free_watermark: usize,
}

impl EntityManager {
    /// Create an empty manager with the default reuse watermark.
    pub fn new() -> Self {
        Self::with_free_watermark(MINIMUM_FREE_INDICES)
    }

    /// Create an empty manager that starts recycling indices once more than
    /// `watermark` of them are free. A watermark of zero recycles immediately.
    pub fn with_free_watermark(watermark: usize) -> Self {
        Self {
            generations: Vec::new(),
            free_indices: VecDeque::new(),
            free_watermark: watermark,
        }
    }

    /// The configured reuse watermark.
    pub fn free_watermark(&self) -> usize {
        self.free_watermark
    }

    /// Allocate a fresh [`EntityId`].
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::IdSpaceExhausted`] when a new slot would need an
    /// index above [`MAX_INDEX`] and the free list is still under the
    /// watermark.
    pub fn create(&mut self) -> Result<EntityId, EcsError> {
        if self.free_indices.len() > self.free_watermark {
            if let Some(index) = self.free_indices.pop_front() {
                // Generation was already bumped on destroy.
                return Ok(EntityId::new(index, self.generations[index as usize]));
            }
        }
        let index = self.generations.len();
        if index > MAX_INDEX as usize {
            return Err(EcsError::IdSpaceExhausted { slots: index });
        }
        self.generations.push(0);
        Ok(EntityId::new(index as u32, 0))
    }

    /// Returns `true` if `id` matches the current generation of its slot.
    #[inline]
    pub fn alive(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        self.generations
            .get(id.index() as usize)
            .is_some_and(|&generation| generation == id.generation())
    }

    /// Destroy an entity, incrementing the generation for its index so that
    /// every outstanding copy of `id` becomes stale.
    ///
    /// Returns `false` (and does nothing) if `id` was already dead.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        if !self.alive(id) {
            return false;
        }
        let slot = &mut self.generations[id.index() as usize];
        *slot = slot.wrapping_add(1);
        self.free_indices.push_back(id.index());
        true
    }

    /// Number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.generations.len() - self.free_indices.len()
    }

    /// Number of index slots ever handed out (alive or free).
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }

    /// Number of indices waiting in the free list.
    pub fn free_count(&self) -> usize {
        self.free_indices.len()
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
