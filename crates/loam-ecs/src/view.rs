//! Multi-component views.
//!
//! A view iterates the entities that own every component in a tuple of types,
//! yielding `(Entity, (&A, &B, ...))`. Iteration is led by the smallest of the
//! requested pools; the remaining pools are probed per entity, so the cost is
//! proportional to the smallest pool rather than the total entity count.

use std::marker::PhantomData;

use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::Entity;
use crate::store::Store;

// ---------------------------------------------------------------------------
// ComponentSet trait -- a tuple of component types
// ---------------------------------------------------------------------------

/// A tuple of component types: `(A,)`, `(A, B)`, up to four.
pub trait ComponentSet: 'static {
    /// Shared references to one entity's components, in tuple order.
    type Refs<'s>;

    /// Registry id of each type, `None` for types the store has never seen.
    fn type_ids(registry: &ComponentRegistry) -> Vec<Option<ComponentTypeId>>;

    /// Borrow every component of `entity`, or `None` if one is missing.
    fn fetch(store: &Store, entity: Entity) -> Option<Self::Refs<'_>>;

    /// Whether `entity` owns every type in the set.
    fn all_of(store: &Store, entity: Entity) -> bool;

    /// Whether `entity` owns at least one type in the set.
    fn any_of(store: &Store, entity: Entity) -> bool;
}

impl ComponentSet for () {
    type Refs<'s> = ();

    fn type_ids(_registry: &ComponentRegistry) -> Vec<Option<ComponentTypeId>> {
        Vec::new()
    }

    fn fetch(store: &Store, entity: Entity) -> Option<Self::Refs<'_>> {
        store.valid(entity).then_some(())
    }

    fn all_of(store: &Store, entity: Entity) -> bool {
        store.valid(entity)
    }

    fn any_of(_store: &Store, _entity: Entity) -> bool {
        false
    }
}

impl<A: Component> ComponentSet for (A,) {
    type Refs<'s> = (&'s A,);

    fn type_ids(registry: &ComponentRegistry) -> Vec<Option<ComponentTypeId>> {
        vec![registry.lookup::<A>()]
    }

    fn fetch(store: &Store, entity: Entity) -> Option<Self::Refs<'_>> {
        Some((store.try_get::<A>(entity)?,))
    }

    fn all_of(store: &Store, entity: Entity) -> bool {
        store.contains::<A>(entity)
    }

    fn any_of(store: &Store, entity: Entity) -> bool {
        store.contains::<A>(entity)
    }
}

impl<A: Component, B: Component> ComponentSet for (A, B) {
    type Refs<'s> = (&'s A, &'s B);

    fn type_ids(registry: &ComponentRegistry) -> Vec<Option<ComponentTypeId>> {
        vec![registry.lookup::<A>(), registry.lookup::<B>()]
    }

    fn fetch(store: &Store, entity: Entity) -> Option<Self::Refs<'_>> {
        Some((store.try_get::<A>(entity)?, store.try_get::<B>(entity)?))
    }

    fn all_of(store: &Store, entity: Entity) -> bool {
        store.contains::<A>(entity) && store.contains::<B>(entity)
    }

    fn any_of(store: &Store, entity: Entity) -> bool {
        store.contains::<A>(entity) || store.contains::<B>(entity)
    }
}

impl<A: Component, B: Component, C: Component> ComponentSet for (A, B, C) {
    type Refs<'s> = (&'s A, &'s B, &'s C);

    fn type_ids(registry: &ComponentRegistry) -> Vec<Option<ComponentTypeId>> {
        vec![
            registry.lookup::<A>(),
            registry.lookup::<B>(),
            registry.lookup::<C>(),
        ]
    }

    fn fetch(store: &Store, entity: Entity) -> Option<Self::Refs<'_>> {
        Some((
            store.try_get::<A>(entity)?,
            store.try_get::<B>(entity)?,
            store.try_get::<C>(entity)?,
        ))
    }

    fn all_of(store: &Store, entity: Entity) -> bool {
        store.contains::<A>(entity) && store.contains::<B>(entity) && store.contains::<C>(entity)
    }

    fn any_of(store: &Store, entity: Entity) -> bool {
        store.contains::<A>(entity) || store.contains::<B>(entity) || store.contains::<C>(entity)
    }
}

impl<A: Component, B: Component, C: Component, D: Component> ComponentSet for (A, B, C, D) {
    type Refs<'s> = (&'s A, &'s B, &'s C, &'s D);

    fn type_ids(registry: &ComponentRegistry) -> Vec<Option<ComponentTypeId>> {
        vec![
            registry.lookup::<A>(),
            registry.lookup::<B>(),
            registry.lookup::<C>(),
            registry.lookup::<D>(),
        ]
    }

    fn fetch(store: &Store, entity: Entity) -> Option<Self::Refs<'_>> {
        Some((
            store.try_get::<A>(entity)?,
            store.try_get::<B>(entity)?,
            store.try_get::<C>(entity)?,
            store.try_get::<D>(entity)?,
        ))
    }

    fn all_of(store: &Store, entity: Entity) -> bool {
        <(A, B)>::all_of(store, entity) && <(C, D)>::all_of(store, entity)
    }

    fn any_of(store: &Store, entity: Entity) -> bool {
        <(A, B)>::any_of(store, entity) || <(C, D)>::any_of(store, entity)
    }
}

// ---------------------------------------------------------------------------
// ViewIter
// ---------------------------------------------------------------------------

/// Iterator returned by [`Store::view`].
pub struct ViewIter<'s, Q: ComponentSet> {
    store: &'s Store,
    /// Entities of the smallest requested pool.
    lead: &'s [Entity],
    cursor: usize,
    _marker: PhantomData<Q>,
}

impl<'s, Q: ComponentSet> ViewIter<'s, Q> {
    pub(crate) fn new(store: &'s Store, lead: &'s [Entity]) -> Self {
        Self {
            store,
            lead,
            cursor: 0,
            _marker: PhantomData,
        }
    }

    /// Size of the pool leading this view; an upper bound on its length.
    pub fn lead_len(&self) -> usize {
        self.lead.len()
    }
}

impl<'s, Q: ComponentSet> Iterator for ViewIter<'s, Q> {
    type Item = (Entity, Q::Refs<'s>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&entity) = self.lead.get(self.cursor) {
            self.cursor += 1;
            if let Some(refs) = Q::fetch(self.store, entity) {
                return Some((entity, refs));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.lead.len() - self.cursor))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
