//! Entity handles and allocation.
//!
//! An [`Entity`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and an *index* in the low 32 bits. The generation is bumped
//! every time an index is released, which allows immediate stale-handle
//! detection once the index is recycled.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;

use crate::EcsError;

/// Largest index an allocator will ever hand out. `u32::MAX` is reserved for
/// [`Entity::NULL`].
pub const MAX_INDEX: u32 = u32::MAX - 1;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// The null handle. Never issued by an allocator and never valid.
    pub const NULL: Self = Self(u64::MAX);

    /// Construct an `Entity` from an index and generation.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` representation.
    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Whether this is [`Entity::NULL`].
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

// Handles sort by index first so that snapshot sections come out in index order.
impl Ord for Entity {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.index(), self.generation()).cmp(&(other.index(), other.generation()))
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("Entity(null)");
        }
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Alive,
    Free,
    /// Generation space exhausted; the index is never handed out again by `create`.
    Retired,
}

/// Result of [`EntityAllocator::assign`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The exact handle was already alive.
    Existing,
    /// The slot was forced to the requested generation and marked alive.
    Assigned,
}

/// Allocates and recycles [`Entity`] handles with generational tracking.
///
/// Free indices are kept in a FIFO queue so that generations are spread out
/// over time rather than concentrated on a hot index.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Current generation for each index slot.
    generations: Vec<u32>,
    /// Lifecycle state for each index slot.
    states: Vec<SlotState>,
    /// Whether the index currently has an entry in `free_indices`.
    queued: Vec<bool>,
    /// Recyclable indices (FIFO). May hold stale entries for slots that were
    /// reclaimed by `assign`; those are skipped on pop.
    free_indices: VecDeque<u32>,
    /// Number of alive slots.
    alive: usize,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator with room for `capacity` indices.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generations: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
            queued: Vec::with_capacity(capacity),
            free_indices: VecDeque::new(),
            alive: 0,
        }
    }

    /// Allocate a fresh [`Entity`].
    ///
    /// If a recycled index is available it is reused with the generation
    /// stored when it was destroyed; otherwise a brand-new index is created.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::IdentifierSpaceExhausted`] when every index up to
    /// [`MAX_INDEX`] is in use or retired.
    pub fn create(&mut self) -> Result<Entity, EcsError> {
        while let Some(index) = self.free_indices.pop_front() {
            let idx = index as usize;
            self.queued[idx] = false;
            if self.states[idx] != SlotState::Free {
                continue;
            }
            self.states[idx] = SlotState::Alive;
            self.alive += 1;
            return Ok(Entity::new(index, self.generations[idx]));
        }

        let index = self.generations.len();
        if index > MAX_INDEX as usize {
            return Err(EcsError::IdentifierSpaceExhausted);
        }
        self.generations.push(0);
        self.states.push(SlotState::Alive);
        self.queued.push(false);
        self.alive += 1;
        Ok(Entity::new(index as u32, 0))
    }

    /// Release an entity, bumping the generation for its index so that every
    /// outstanding copy of the handle becomes stale.
    ///
    /// An index whose generation cannot be bumped any further is retired
    /// instead of being queued for reuse.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidHandle`] if `entity` is not valid.
    pub fn destroy(&mut self, entity: Entity) -> Result<(), EcsError> {
        if !self.valid(entity) {
            return Err(EcsError::InvalidHandle { entity });
        }
        let idx = entity.index() as usize;
        self.alive -= 1;
        match entity.generation().checked_add(1) {
            Some(next) => {
                self.generations[idx] = next;
                self.states[idx] = SlotState::Free;
                self.enqueue(entity.index());
            }
            None => {
                self.states[idx] = SlotState::Retired;
                tracing::debug!(
                    index = entity.index(),
                    "index retired after generation overflow"
                );
            }
        }
        Ok(())
    }

    /// Returns `true` if `entity` refers to an alive slot whose generation
    /// matches the handle's generation.
    pub fn valid(&self, entity: Entity) -> bool {
        let idx = entity.index() as usize;
        matches!(self.states.get(idx), Some(SlotState::Alive))
            && self.generations[idx] == entity.generation()
    }

    /// Force the slot at `entity.index()` to hold exactly `entity`.
    ///
    /// This bypasses the monotonic generation path of `create`/`destroy` and
    /// is meant for restoring identities from a snapshot. Slots skipped over
    /// while growing the table become free. Cost is O(1) amortized no matter
    /// how far apart the stored and requested generations are.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidHandle`] for [`Entity::NULL`], or when a
    /// *different* generation is currently alive at that index (the caller
    /// must destroy it first).
    pub fn assign(&mut self, entity: Entity) -> Result<AssignOutcome, EcsError> {
        if entity.is_null() || entity.index() > MAX_INDEX {
            return Err(EcsError::InvalidHandle { entity });
        }
        let idx = entity.index() as usize;
        while self.generations.len() <= idx {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.states.push(SlotState::Free);
            self.queued.push(false);
            self.enqueue(index);
        }

        match self.states[idx] {
            SlotState::Alive if self.generations[idx] == entity.generation() => {
                Ok(AssignOutcome::Existing)
            }
            SlotState::Alive => Err(EcsError::InvalidHandle { entity }),
            SlotState::Free | SlotState::Retired => {
                self.generations[idx] = entity.generation();
                self.states[idx] = SlotState::Alive;
                self.alive += 1;
                Ok(AssignOutcome::Assigned)
            }
        }
    }

    /// The live handle stored at `index`, if that slot is alive.
    pub fn current(&self, index: u32) -> Option<Entity> {
        let idx = index as usize;
        match self.states.get(idx) {
            Some(SlotState::Alive) => Some(Entity::new(index, self.generations[idx])),
            _ => None,
        }
    }

    /// Number of currently alive entities.
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Whether no entity is alive.
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Number of index slots ever allocated (alive, free or retired).
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }

    /// Destroy every alive entity. Slots and generations are kept, so every
    /// handle issued before the call stays invalid afterwards.
    pub fn clear(&mut self) {
        let alive: Vec<Entity> = self.iter().collect();
        for entity in &alive {
            let released = self.destroy(*entity);
            debug_assert!(released.is_ok());
        }
        if !alive.is_empty() {
            tracing::debug!(count = alive.len(), "allocator cleared");
        }
    }

    /// Iterate alive handles in increasing index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.states
            .iter()
            .zip(&self.generations)
            .enumerate()
            .filter(|(_, (state, _))| **state == SlotState::Alive)
            .map(|(idx, (_, &generation))| Entity::new(idx as u32, generation))
    }

    fn enqueue(&mut self, index: u32) {
        let idx = index as usize;
        if !self.queued[idx] {
            self.queued[idx] = true;
            self.free_indices.push_back(index);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
