//! The [`Store`] is the top-level container. It owns the entity allocator,
//! the component registry, and one packed pool per component type.

use crate::component::{Component, ComponentMask, ComponentRegistry, ComponentTypeId};
use crate::config::StoreConfig;
use crate::entity::{AssignOutcome, Entity, EntityAllocator};
use crate::pool::{ComponentPool, ErasedPool};
use crate::view::{ComponentSet, ViewIter};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Entity-component store (a.k.a. registry).
///
/// Pools are created lazily the first time a component type is used, so no
/// up-front registration is needed. Handles are plain values; nothing in the
/// store ever references a caller-held handle.
pub struct Store {
    /// Entity handle allocator.
    allocator: EntityAllocator,
    /// Component type registry; `ComponentTypeId` indexes `pools`.
    registry: ComponentRegistry,
    /// One pool per registered type, type-erased for cascade-destroy.
    pools: Vec<Box<dyn ErasedPool>>,
    /// Per entity-index presence bits, maintained when `track_presence` is on.
    masks: Vec<ComponentMask>,
    config: StoreConfig,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("entity_count", &self.allocator.len())
            .field("pool_count", &self.pools.len())
            .field("track_presence", &self.config.track_presence)
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an empty store with the default [`StoreConfig`].
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        let masks = if config.track_presence {
            Vec::with_capacity(config.entity_capacity)
        } else {
            Vec::new()
        };
        Self {
            allocator: EntityAllocator::with_capacity(config.entity_capacity),
            registry: ComponentRegistry::new(),
            pools: Vec::new(),
            masks,
            config,
        }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Read-only access to the entity allocator.
    pub fn allocator(&self) -> &EntityAllocator {
        &self.allocator
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // -- pool management ----------------------------------------------------

    /// Id for `T`, creating its pool on first use.
    fn pool_id<T: Component>(&mut self) -> ComponentTypeId {
        let id = self.registry.register::<T>();
        if id.index() == self.pools.len() {
            self.pools.push(Box::new(ComponentPool::<T>::new()));
        }
        id
    }

    fn typed<T: Component>(pool: &dyn ErasedPool) -> &ComponentPool<T> {
        pool.as_any()
            .downcast_ref::<ComponentPool<T>>()
            .expect("pool stored under the wrong component type")
    }

    fn typed_mut<T: Component>(pool: &mut dyn ErasedPool) -> &mut ComponentPool<T> {
        pool.as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .expect("pool stored under the wrong component type")
    }

    /// The pool for `T`, if the type has been used with this store.
    pub fn pool<T: Component>(&self) -> Option<&ComponentPool<T>> {
        let id = self.registry.lookup::<T>()?;
        Some(Self::typed::<T>(self.pools[id.index()].as_ref()))
    }

    fn pool_mut<T: Component>(&mut self) -> Option<&mut ComponentPool<T>> {
        let id = self.registry.lookup::<T>()?;
        Some(Self::typed_mut::<T>(self.pools[id.index()].as_mut()))
    }

    fn ensure_mask(&mut self, entity: Entity) {
        if !self.config.track_presence {
            return;
        }
        let idx = entity.index() as usize;
        if self.masks.len() <= idx {
            self.masks.resize_with(idx + 1, ComponentMask::new);
        }
        self.masks[idx].clear();
    }

    fn mark(&mut self, entity: Entity, id: ComponentTypeId, present: bool) {
        if let Some(mask) = self.masks.get_mut(entity.index() as usize) {
            if present {
                mask.insert(id);
            } else {
                mask.remove(id);
            }
        }
    }

    /// The presence mask of a live entity, when presence tracking is on.
    pub fn mask(&self, entity: Entity) -> Option<&ComponentMask> {
        if !self.valid(entity) {
            return None;
        }
        self.masks.get(entity.index() as usize)
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create a new entity with no components.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::IdentifierSpaceExhausted`] if no index is left.
    pub fn create(&mut self) -> Result<Entity, EcsError> {
        let entity = self.allocator.create()?;
        self.ensure_mask(entity);
        tracing::trace!(%entity, "entity created");
        Ok(entity)
    }

    /// Destroy an entity and every component it owns.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidHandle`] if `entity` is not valid.
    pub fn destroy(&mut self, entity: Entity) -> Result<(), EcsError> {
        if !self.allocator.valid(entity) {
            return Err(EcsError::InvalidHandle { entity });
        }
        self.strip(entity);
        self.allocator.destroy(entity)?;
        tracing::trace!(%entity, "entity destroyed");
        Ok(())
    }

    /// Remove `entity` from every pool holding it.
    fn strip(&mut self, entity: Entity) {
        if self.config.track_presence {
            let idx = entity.index() as usize;
            let Some(mask) = self.masks.get_mut(idx) else {
                return;
            };
            let mut owned = std::mem::take(mask);
            for id in owned.iter() {
                self.pools[id.index()].erase(entity);
            }
            owned.clear();
            self.masks[idx] = owned;
        } else {
            for pool in &mut self.pools {
                pool.erase(entity);
            }
        }
    }

    /// Whether `entity` is alive in this store.
    pub fn valid(&self, entity: Entity) -> bool {
        self.allocator.valid(entity)
    }

    /// Number of alive entities.
    pub fn len(&self) -> usize {
        self.allocator.len()
    }

    /// Whether the store has no alive entities.
    pub fn is_empty(&self) -> bool {
        self.allocator.is_empty()
    }

    /// Alive handles in increasing index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.allocator.iter()
    }

    /// Make `entity` alive with its exact index and generation.
    ///
    /// A different live entity occupying the same index is destroyed first,
    /// components included.
    pub(crate) fn assign(&mut self, entity: Entity) -> Result<AssignOutcome, EcsError> {
        if let Some(current) = self.allocator.current(entity.index()) {
            if current != entity {
                tracing::debug!(displaced = %current, restored = %entity, "replacing live entity");
                self.destroy(current)?;
            }
        }
        let outcome = self.allocator.assign(entity)?;
        if outcome == AssignOutcome::Assigned {
            self.ensure_mask(entity);
        }
        Ok(outcome)
    }

    /// Destroy every entity and drop every component. Pools stay registered.
    pub fn clear(&mut self) {
        for pool in &mut self.pools {
            pool.clear();
        }
        for mask in &mut self.masks {
            mask.clear();
        }
        self.allocator.clear();
    }

    // -- component access ---------------------------------------------------

    /// Attach a component to an entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidHandle`] if `entity` is not valid, or
    /// [`EcsError::DuplicateComponent`] if it already owns a `T`.
    pub fn emplace<T: Component>(&mut self, entity: Entity, value: T) -> Result<&mut T, EcsError> {
        if !self.allocator.valid(entity) {
            return Err(EcsError::InvalidHandle { entity });
        }
        let id = self.pool_id::<T>();
        self.mark(entity, id, true);
        Self::typed_mut::<T>(self.pools[id.index()].as_mut()).emplace(entity, value)
    }

    /// Attach a component, replacing any existing `T`. Returns the old value.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidHandle`] if `entity` is not valid.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> Result<Option<T>, EcsError> {
        if !self.allocator.valid(entity) {
            return Err(EcsError::InvalidHandle { entity });
        }
        let id = self.pool_id::<T>();
        self.mark(entity, id, true);
        Ok(Self::typed_mut::<T>(self.pools[id.index()].as_mut()).insert(entity, value))
    }

    /// Shared reference to `entity`'s `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidHandle`] for a dead handle and
    /// [`EcsError::MissingComponent`] if the entity has no `T`.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        if !self.allocator.valid(entity) {
            return Err(EcsError::InvalidHandle { entity });
        }
        self.try_get::<T>(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<T>(),
        })
    }

    /// Mutable reference to `entity`'s `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidHandle`] for a dead handle and
    /// [`EcsError::MissingComponent`] if the entity has no `T`.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        if !self.allocator.valid(entity) {
            return Err(EcsError::InvalidHandle { entity });
        }
        self.try_get_mut::<T>(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<T>(),
        })
    }

    /// Shared reference to `entity`'s `T`, if any.
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.pool::<T>()?.try_get(entity)
    }

    /// Mutable reference to `entity`'s `T`, if any.
    pub fn try_get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.pool_mut::<T>()?.try_get_mut(entity)
    }

    /// Whether `entity` owns a `T`.
    pub fn contains<T: Component>(&self, entity: Entity) -> bool {
        self.pool::<T>().is_some_and(|pool| pool.contains(entity))
    }

    /// Detach and return `entity`'s `T`.
    pub fn take<T: Component>(&mut self, entity: Entity) -> Option<T> {
        let id = self.registry.lookup::<T>()?;
        let value = Self::typed_mut::<T>(self.pools[id.index()].as_mut()).take(entity)?;
        self.mark(entity, id, false);
        Some(value)
    }

    /// Detach `entity`'s `T`. Returns `false` if there was none.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> bool {
        self.take::<T>(entity).is_some()
    }

    /// Number of entities owning a `T`.
    pub fn count<T: Component>(&self) -> usize {
        self.pool::<T>().map_or(0, ComponentPool::len)
    }

    /// Iterate `(entity, &mut T)` over every owner of `T`, in pool order.
    pub fn iter_mut<T: Component>(&mut self) -> impl Iterator<Item = (Entity, &mut T)> + '_ {
        self.pool_mut::<T>().into_iter().flat_map(|pool| pool.iter_mut())
    }

    // -- multi-component access ---------------------------------------------

    /// Iterate entities that own every type in `Q`.
    ///
    /// The smallest of the requested pools leads the iteration and the others
    /// are probed per entity. If any requested type has never been used with
    /// this store the view is empty.
    ///
    /// ```ignore
    /// for (entity, (pos, vel)) in store.view::<(Position, Velocity)>() {
    ///     println!("{entity}: {pos:?} {vel:?}");
    /// }
    /// ```
    pub fn view<Q: ComponentSet>(&self) -> ViewIter<'_, Q> {
        let ids = Q::type_ids(&self.registry);
        let mut lead: &[Entity] = &[];
        if !ids.is_empty() && ids.iter().all(Option::is_some) {
            lead = ids
                .iter()
                .flatten()
                .map(|id| self.pools[id.index()].entities())
                .min_by_key(|entities| entities.len())
                .unwrap_or(&[]);
        }
        ViewIter::new(self, lead)
    }

    /// Visit every owner of `T` that also owns everything in `Q`, with
    /// mutable access to `T` and shared access to the `Q` components.
    ///
    /// `Q` must not contain `T`; such a set matches nothing.
    pub fn each_mut<T, Q, F>(&mut self, mut f: F)
    where
        T: Component,
        Q: ComponentSet,
        F: for<'a> FnMut(Entity, &'a mut T, Q::Refs<'a>),
    {
        let Some(id) = self.registry.lookup::<T>() else {
            return;
        };
        let placeholder: Box<dyn ErasedPool> = Box::new(ComponentPool::<T>::new());
        let mut pool = std::mem::replace(&mut self.pools[id.index()], placeholder);
        {
            let this: &Store = self;
            for (entity, value) in Self::typed_mut::<T>(pool.as_mut()).iter_mut() {
                if let Some(refs) = Q::fetch(this, entity) {
                    f(entity, value, refs);
                }
            }
        }
        self.pools[id.index()] = pool;
    }

    /// Whether `entity` owns every type in `Q`.
    pub fn all_of<Q: ComponentSet>(&self, entity: Entity) -> bool {
        Q::all_of(self, entity)
    }

    /// Whether `entity` owns at least one type in `Q`.
    pub fn any_of<Q: ComponentSet>(&self, entity: Entity) -> bool {
        Q::any_of(self, entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
