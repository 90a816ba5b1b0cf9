//! Loam ECS -- sparse-set entity component store with snapshot support.
//!
//! Entities are generational 64-bit handles. Each component type lives in its
//! own packed pool, so adding or removing a component never moves any other
//! component of the same entity. Stores can be written to and restored from
//! an archive with exact handle identities preserved.
//!
//! # Quick Start
//!
//! ```
//! use loam_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut store = Store::new();
//! let entity = store.create().unwrap();
//! store.emplace(entity, Position { x: 0.0, y: 0.0 }).unwrap();
//! store.emplace(entity, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
//!
//! store.each_mut::<Position, (Velocity,), _>(|_, pos, (vel,)| pos.x += vel.dx);
//! assert_eq!(store.get::<Position>(entity).unwrap(), &Position { x: 1.0, y: 0.0 });
//!
//! let mut out = JsonOutputArchive::new();
//! SnapshotWriter::new(&store)
//!     .entities(&mut out).unwrap()
//!     .component::<Position, _>(&mut out).unwrap();
//!
//! let mut restored = Store::new();
//! let mut input = JsonInputArchive::from_value(out.into_value()).unwrap();
//! SnapshotLoader::new(&mut restored)
//!     .entities(&mut input).unwrap()
//!     .component::<Position, _>(&mut input).unwrap();
//! assert_eq!(restored.get::<Position>(entity).unwrap(), &Position { x: 1.0, y: 0.0 });
//! ```

#![deny(unsafe_code)]

pub mod archive;
pub mod component;
pub mod config;
pub mod entity;
pub mod pool;
pub mod snapshot;
pub mod store;
pub mod view;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by store and snapshot operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The handle is null, stale, or was never issued by this store.
    #[error("entity {entity} is not valid (stale, destroyed or never allocated)")]
    InvalidHandle { entity: entity::Entity },

    /// Every index below the null sentinel is in use.
    #[error("entity identifier space exhausted")]
    IdentifierSpaceExhausted,

    /// `emplace` on an entity that already owns the component.
    #[error("entity {entity} already has component '{component}'")]
    DuplicateComponent {
        entity: entity::Entity,
        component: &'static str,
    },

    /// Access to a component the entity does not own.
    #[error("entity {entity} has no component '{component}'")]
    MissingComponent {
        entity: entity::Entity,
        component: &'static str,
    },

    /// A snapshot section could not be written or was rejected on load.
    #[error("corrupt snapshot section '{section}': {reason}")]
    CorruptSnapshot {
        section: &'static str,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archive::{
        ArchiveError, InputArchive, JsonInputArchive, JsonOutputArchive, OutputArchive,
    };
    pub use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::config::{SnapshotConfig, StoreConfig};
    pub use crate::entity::{Entity, EntityAllocator};
    pub use crate::pool::ComponentPool;
    pub use crate::snapshot::{SnapshotLoader, SnapshotWriter};
    pub use crate::store::Store;
    pub use crate::view::{ComponentSet, ViewIter};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    // -- test component types -----------------------------------------------

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health(u32);

    /// A component that refers to another entity.
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Target(Entity);

    // -- lifecycle ----------------------------------------------------------

    #[test]
    fn create_emplace_and_read_back() {
        let mut store = Store::new();
        let e = store.create().unwrap();
        store.emplace(e, Position { x: 1.0, y: 2.0 }).unwrap();
        store.emplace(e, Velocity { dx: 3.0, dy: 4.0 }).unwrap();

        assert_eq!(
            store.get::<Position>(e).unwrap(),
            &Position { x: 1.0, y: 2.0 }
        );
        assert_eq!(
            store.get::<Velocity>(e).unwrap(),
            &Velocity { dx: 3.0, dy: 4.0 }
        );
    }

    #[test]
    fn destroy_entity_verify_gone() {
        let mut store = Store::new();
        let e = store.create().unwrap();
        store.emplace(e, Position { x: 0.0, y: 0.0 }).unwrap();
        store.destroy(e).unwrap();
        assert!(!store.valid(e));
        assert!(store.try_get::<Position>(e).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn stale_handle_after_recycle() {
        let mut store = Store::new();
        let old = store.create().unwrap();
        store.emplace(old, Health(10)).unwrap();
        store.destroy(old).unwrap();

        let new = store.create().unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        store.emplace(new, Health(20)).unwrap();

        assert!(!store.valid(old));
        assert!(matches!(
            store.get::<Health>(old),
            Err(EcsError::InvalidHandle { .. })
        ));
        assert!(!store.contains::<Health>(old));
        assert_eq!(store.get::<Health>(new).unwrap(), &Health(20));
    }

    #[test]
    fn error_messages_name_the_component() {
        let mut store = Store::new();
        let e = store.create().unwrap();
        let err = store.get::<Health>(e).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Health"), "{msg}");
        assert!(msg.contains(&e.to_string()), "{msg}");
    }

    // -- views --------------------------------------------------------------

    #[test]
    fn movement_system() {
        let mut store = Store::new();
        let moving: Vec<Entity> = (0..4)
            .map(|i| {
                let e = store.create().unwrap();
                store.emplace(e, Position { x: i as f32, y: 0.0 }).unwrap();
                store.emplace(e, Velocity { dx: 1.0, dy: 0.5 }).unwrap();
                e
            })
            .collect();
        let still = store.create().unwrap();
        store.emplace(still, Position { x: -1.0, y: -1.0 }).unwrap();

        for _ in 0..2 {
            store.each_mut::<Position, (Velocity,), _>(|_, pos, (vel,)| {
                pos.x += vel.dx;
                pos.y += vel.dy;
            });
        }

        for (i, e) in moving.iter().enumerate() {
            assert_eq!(
                store.get::<Position>(*e).unwrap(),
                &Position { x: i as f32 + 2.0, y: 1.0 }
            );
        }
        assert_eq!(
            store.get::<Position>(still).unwrap(),
            &Position { x: -1.0, y: -1.0 }
        );
        assert_eq!(store.view::<(Position, Velocity)>().count(), 4);
    }

    // -- snapshot -----------------------------------------------------------

    #[test]
    fn snapshot_preserves_cross_references() {
        let mut store = Store::new();
        let hunter = store.create().unwrap();
        let prey = store.create().unwrap();
        store.destroy(hunter).unwrap();
        let hunter = store.create().unwrap();
        store.emplace(hunter, Target(prey)).unwrap();
        store.emplace(prey, Health(3)).unwrap();

        let mut out = JsonOutputArchive::new();
        SnapshotWriter::new(&store)
            .entities(&mut out)
            .unwrap()
            .component::<Target, _>(&mut out)
            .unwrap()
            .component::<Health, _>(&mut out)
            .unwrap();
        let text = out.to_json_string().unwrap();

        let mut restored = Store::new();
        let mut input = JsonInputArchive::from_str(&text).unwrap();
        SnapshotLoader::new(&mut restored)
            .entities(&mut input)
            .unwrap()
            .component::<Target, _>(&mut input)
            .unwrap()
            .component::<Health, _>(&mut input)
            .unwrap();

        let target = restored.get::<Target>(hunter).unwrap().0;
        assert_eq!(target, prey);
        assert_eq!(restored.get::<Health>(target).unwrap(), &Health(3));
        assert_eq!(restored.len(), 2);
    }
}
