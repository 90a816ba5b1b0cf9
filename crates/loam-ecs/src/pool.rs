//! Per-type packed component storage.
//!
//! A [`ComponentPool<T>`] is a sparse set: a `sparse` table indexed by entity
//! index points into gap-free `dense`/`data` arrays. Insert, lookup and
//! removal are O(1); iteration walks the dense arrays directly.
//!
//! Invariant: for every index `i` with `sparse[i] != EMPTY`,
//! `dense[sparse[i]].index() == i`, and `dense.len() == data.len()`.

use std::any::Any;

use crate::component::Component;
use crate::entity::Entity;
use crate::EcsError;

/// Sparse-table sentinel for "no component at this index".
const EMPTY: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// ComponentPool
// ---------------------------------------------------------------------------

/// Packed storage for every value of one component type.
#[derive(Debug)]
pub struct ComponentPool<T> {
    /// Entity index -> position in `dense`/`data`, or `EMPTY`.
    sparse: Vec<u32>,
    /// Owning handle for each packed value.
    dense: Vec<Entity>,
    /// Packed values, parallel to `dense`.
    data: Vec<T>,
}

impl<T> Default for ComponentPool<T> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            data: Vec::new(),
        }
    }
}

impl<T: Component> ComponentPool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn position(&self, entity: Entity) -> Option<usize> {
        let pos = *self.sparse.get(entity.index() as usize)?;
        if pos == EMPTY {
            return None;
        }
        let pos = pos as usize;
        (self.dense[pos] == entity).then_some(pos)
    }

    /// Attach `value` to `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateComponent`] if the entity's index already
    /// holds a value in this pool.
    pub fn emplace(&mut self, entity: Entity, value: T) -> Result<&mut T, EcsError> {
        let idx = entity.index() as usize;
        if self.sparse.get(idx).is_some_and(|&pos| pos != EMPTY) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: std::any::type_name::<T>(),
            });
        }
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, EMPTY);
        }
        self.sparse[idx] = self.dense.len() as u32;
        self.dense.push(entity);
        self.data.push(value);
        let last = self.data.len() - 1;
        Ok(&mut self.data[last])
    }

    /// Attach `value` to `entity`, overwriting any existing value for the
    /// same handle. Returns the replaced value.
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        match self.position(entity) {
            Some(pos) => Some(std::mem::replace(&mut self.data[pos], value)),
            None => {
                // A stale handle on the same index would otherwise block the slot.
                self.remove_index(entity.index());
                let idx = entity.index() as usize;
                if idx >= self.sparse.len() {
                    self.sparse.resize(idx + 1, EMPTY);
                }
                self.sparse[idx] = self.dense.len() as u32;
                self.dense.push(entity);
                self.data.push(value);
                None
            }
        }
    }

    /// Shared reference to `entity`'s value.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the entity has no value here.
    pub fn get(&self, entity: Entity) -> Result<&T, EcsError> {
        self.try_get(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<T>(),
        })
    }

    /// Mutable reference to `entity`'s value.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::MissingComponent`] if the entity has no value here.
    pub fn get_mut(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        self.try_get_mut(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<T>(),
        })
    }

    /// Shared reference to `entity`'s value, if present.
    pub fn try_get(&self, entity: Entity) -> Option<&T> {
        self.position(entity).map(|pos| &self.data[pos])
    }

    /// Mutable reference to `entity`'s value, if present.
    pub fn try_get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.position(entity).map(move |pos| &mut self.data[pos])
    }

    /// Whether `entity` (exact generation) has a value here.
    pub fn contains(&self, entity: Entity) -> bool {
        self.position(entity).is_some()
    }

    /// Detach and return `entity`'s value.
    ///
    /// The last packed value is moved into the vacated slot, so iteration
    /// order changes.
    pub fn take(&mut self, entity: Entity) -> Option<T> {
        let pos = self.position(entity)?;
        Some(self.swap_remove(pos))
    }

    /// Detach `entity`'s value. Returns `false` (and does nothing) if absent.
    pub fn remove(&mut self, entity: Entity) -> bool {
        self.take(entity).is_some()
    }

    fn remove_index(&mut self, index: u32) {
        if let Some(&pos) = self.sparse.get(index as usize) {
            if pos != EMPTY {
                self.swap_remove(pos as usize);
            }
        }
    }

    fn swap_remove(&mut self, pos: usize) -> T {
        let removed = self.dense[pos];
        let last = self.dense.len() - 1;
        if pos != last {
            let moved = self.dense[last];
            self.sparse[moved.index() as usize] = pos as u32;
        }
        self.sparse[removed.index() as usize] = EMPTY;
        self.dense.swap_remove(pos);
        self.data.swap_remove(pos)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Owning handles in current packed order.
    pub fn entities(&self) -> &[Entity] {
        &self.dense
    }

    /// Values in current packed order.
    pub fn values(&self) -> &[T] {
        &self.data
    }

    /// `(handle, &value)` pairs in current packed order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (Entity, &T)> {
        self.dense.iter().copied().zip(self.data.iter())
    }

    /// `(handle, &mut value)` pairs in current packed order.
    pub fn iter_mut(&mut self) -> impl ExactSizeIterator<Item = (Entity, &mut T)> {
        self.dense.iter().copied().zip(self.data.iter_mut())
    }

    /// Drop every value.
    pub fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.data.clear();
    }
}

// ---------------------------------------------------------------------------
// ErasedPool -- uniform capability the store uses for cascade-destroy
// ---------------------------------------------------------------------------

/// Type-erased view of a [`ComponentPool`].
///
/// The store keeps one boxed `ErasedPool` per component type so it can remove
/// an entity from every pool without knowing the concrete types.
pub trait ErasedPool: Any + Send + Sync {
    /// Whether `entity` has a value in this pool.
    fn contains_entity(&self, entity: Entity) -> bool;
    /// Drop `entity`'s value if present. Returns whether anything was removed.
    fn erase(&mut self, entity: Entity) -> bool;
    /// Number of stored values.
    fn len(&self) -> usize;
    /// Owning handles in current packed order.
    fn entities(&self) -> &[Entity];
    /// Whether the pool is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Drop every value.
    fn clear(&mut self);
    /// Name of the stored component type.
    fn component_name(&self) -> &'static str;
    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
    /// Downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedPool for ComponentPool<T> {
    fn contains_entity(&self, entity: Entity) -> bool {
        self.contains(entity)
    }

    fn erase(&mut self, entity: Entity) -> bool {
        self.remove(entity)
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn entities(&self) -> &[Entity] {
        &self.dense
    }

    fn clear(&mut self) {
        ComponentPool::clear(self);
    }

    fn component_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
