//! Snapshot save and restore.
//!
//! A snapshot is a sequence of sections written through an
//! [`OutputArchive`]: one entity section listing live handles, then any
//! number of component sections, one per component type. The loader reads
//! the same sections in the same order and restores entities with their
//! exact handles, so references stored inside components stay meaningful.
//!
//! ```text
//! entity section    := count, (index, generation){count}
//! component section := count, (index, generation, payload){count}
//! ```
//!
//! Component types are not tagged in the stream; the caller chooses the
//! section order and must load in the order it saved.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::archive::{ArchiveError, InputArchive, OutputArchive};
use crate::component::Component;
use crate::config::SnapshotConfig;
use crate::entity::{AssignOutcome, Entity, MAX_INDEX};
use crate::store::Store;
use crate::EcsError;

/// Section name used for entity sections in errors and logs.
const ENTITY_SECTION: &str = "entities";

/// Section name reported when the output archive rejects a write.
const WRITE_SECTION: &str = "write";

/// Upper bound on up-front allocation for a declared section length.
const PREALLOC_LIMIT: usize = 4096;

fn write_failed(err: ArchiveError) -> EcsError {
    tracing::warn!(error = %err, "snapshot write failed");
    EcsError::CorruptSnapshot {
        section: WRITE_SECTION,
        reason: err.to_string(),
    }
}

fn corrupt(section: &'static str, reason: impl Into<String>) -> EcsError {
    let reason = reason.into();
    tracing::warn!(section, reason = %reason, "snapshot section rejected");
    EcsError::CorruptSnapshot { section, reason }
}

// ---------------------------------------------------------------------------
// SnapshotWriter
// ---------------------------------------------------------------------------

/// Writes a store, or a chosen subset of its entities, into an archive.
///
/// ```ignore
/// let mut out = JsonOutputArchive::new();
/// SnapshotWriter::new(&store)
///     .entities(&mut out)?
///     .component::<Position, _>(&mut out)?;
/// ```
#[derive(Debug)]
pub struct SnapshotWriter<'s> {
    store: &'s Store,
    /// Sorted and deduplicated; `None` means every live entity.
    subset: Option<Vec<Entity>>,
}

impl<'s> SnapshotWriter<'s> {
    /// Cover every live entity of `store`.
    pub fn new(store: &'s Store) -> Self {
        Self {
            store,
            subset: None,
        }
    }

    /// Cover only the listed entities. Handles that are not alive are
    /// ignored, as are duplicates.
    pub fn subset(store: &'s Store, entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut chosen: Vec<Entity> = entities.into_iter().filter(|&e| store.valid(e)).collect();
        chosen.sort_unstable();
        chosen.dedup();
        Self {
            store,
            subset: Some(chosen),
        }
    }

    fn covers(&self, entity: Entity) -> bool {
        match &self.subset {
            Some(chosen) => chosen.binary_search(&entity).is_ok(),
            None => true,
        }
    }

    /// Write the entity section: covered handles in increasing index order.
    ///
    /// # Errors
    ///
    /// [`EcsError::CorruptSnapshot`] with section `"write"` if the archive
    /// rejects a value.
    pub fn entities<A: OutputArchive>(&self, archive: &mut A) -> Result<&Self, EcsError> {
        let handles: Vec<Entity> = match &self.subset {
            Some(chosen) => chosen.clone(),
            None => self.store.entities().collect(),
        };
        write_count(archive, handles.len())?;
        for entity in &handles {
            archive.write_u32(entity.index()).map_err(write_failed)?;
            archive.write_u32(entity.generation()).map_err(write_failed)?;
        }
        tracing::debug!(section = ENTITY_SECTION, count = handles.len(), "snapshot section written");
        Ok(self)
    }

    /// Write the component section for `T`, in pool order.
    ///
    /// # Errors
    ///
    /// [`EcsError::CorruptSnapshot`] with section `"write"` if the archive
    /// rejects a value.
    pub fn component<T, A>(&self, archive: &mut A) -> Result<&Self, EcsError>
    where
        T: Component + Serialize,
        A: OutputArchive,
    {
        let records: Vec<(Entity, &T)> = match self.store.pool::<T>() {
            Some(pool) => pool.iter().filter(|(e, _)| self.covers(*e)).collect(),
            None => Vec::new(),
        };
        write_count(archive, records.len())?;
        for (entity, value) in &records {
            archive.write_u32(entity.index()).map_err(write_failed)?;
            archive.write_u32(entity.generation()).map_err(write_failed)?;
            archive.write_value(*value).map_err(write_failed)?;
        }
        tracing::debug!(
            section = std::any::type_name::<T>(),
            count = records.len(),
            "snapshot section written"
        );
        Ok(self)
    }
}

fn write_count<A: OutputArchive>(archive: &mut A, count: usize) -> Result<(), EcsError> {
    let count = u32::try_from(count)
        .map_err(|_| write_failed(ArchiveError::Codec(format!("section of {count} records"))))?;
    archive.write_u32(count).map_err(write_failed)
}

// ---------------------------------------------------------------------------
// SnapshotLoader
// ---------------------------------------------------------------------------

/// Restores sections written by [`SnapshotWriter`] into a store.
///
/// Each section is decoded and validated in full before the store is
/// touched, so a rejected section leaves the store as it was. Sections that
/// were already loaded stay loaded.
#[derive(Debug)]
pub struct SnapshotLoader<'s> {
    store: &'s mut Store,
    config: SnapshotConfig,
    /// Live entities of the destination before loading started.
    previously_alive: Vec<Entity>,
    /// Handles assigned by entity sections, keyed by index.
    loaded: HashMap<u32, Entity>,
}

impl<'s> SnapshotLoader<'s> {
    /// Load into `store` with the default [`SnapshotConfig`].
    pub fn new(store: &'s mut Store) -> Self {
        Self::with_config(store, SnapshotConfig::default())
    }

    pub fn with_config(store: &'s mut Store, config: SnapshotConfig) -> Self {
        let previously_alive = store.entities().collect();
        Self {
            store,
            config,
            previously_alive,
            loaded: HashMap::new(),
        }
    }

    /// Number of distinct entities restored so far.
    pub fn loaded(&self) -> usize {
        self.loaded.len()
    }

    /// Whether `entity` was restored by this loader.
    pub fn is_loaded(&self, entity: Entity) -> bool {
        self.loaded.get(&entity.index()) == Some(&entity)
    }

    fn read_count<A: InputArchive>(
        &self,
        archive: &mut A,
        section: &'static str,
    ) -> Result<usize, EcsError> {
        let count = archive
            .read_u32()
            .map_err(|err| corrupt(section, format!("count: {err}")))?;
        if count > self.config.max_section_len {
            return Err(corrupt(
                section,
                format!(
                    "declared {count} records, limit is {}",
                    self.config.max_section_len
                ),
            ));
        }
        Ok(count as usize)
    }

    fn read_handle<A: InputArchive>(
        &self,
        archive: &mut A,
        section: &'static str,
        n: usize,
    ) -> Result<Entity, EcsError> {
        let index = archive
            .read_u32()
            .map_err(|err| corrupt(section, format!("record {n} index: {err}")))?;
        let generation = archive
            .read_u32()
            .map_err(|err| corrupt(section, format!("record {n} generation: {err}")))?;
        let entity = Entity::new(index, generation);
        if entity.is_null() || index > MAX_INDEX {
            return Err(corrupt(section, format!("record {n} is not a valid handle")));
        }
        if index > self.config.max_index {
            return Err(corrupt(
                section,
                format!(
                    "record {n} index {index} exceeds limit {}",
                    self.config.max_index
                ),
            ));
        }
        Ok(entity)
    }

    /// Read an entity section and make every listed handle alive with its
    /// exact index and generation. A live entity occupying one of those
    /// indices under another generation is destroyed first.
    ///
    /// # Errors
    ///
    /// [`EcsError::CorruptSnapshot`] if the section is truncated, lists
    /// [`Entity::NULL`] or an index above [`SnapshotConfig::max_index`], or
    /// lists an index twice.
    pub fn entities<A: InputArchive>(&mut self, archive: &mut A) -> Result<&mut Self, EcsError> {
        let count = self.read_count(archive, ENTITY_SECTION)?;
        let mut handles = Vec::with_capacity(count.min(PREALLOC_LIMIT));
        let mut seen = HashSet::with_capacity(count.min(PREALLOC_LIMIT));
        for n in 0..count {
            let entity = self.read_handle(archive, ENTITY_SECTION, n)?;
            if !seen.insert(entity.index()) {
                return Err(corrupt(
                    ENTITY_SECTION,
                    format!("index {} listed twice", entity.index()),
                ));
            }
            handles.push(entity);
        }

        let mut assigned = 0usize;
        for entity in handles {
            if self.store.assign(entity)? == AssignOutcome::Assigned {
                assigned += 1;
            }
            self.loaded.insert(entity.index(), entity);
        }
        tracing::debug!(section = ENTITY_SECTION, count, assigned, "snapshot section loaded");
        Ok(self)
    }

    /// Read the component section for `T`. Existing values are overwritten.
    ///
    /// # Errors
    ///
    /// [`EcsError::CorruptSnapshot`] if the section is truncated, a payload
    /// does not decode, or a record names an entity no entity section of this
    /// loader restored.
    pub fn component<T, A>(&mut self, archive: &mut A) -> Result<&mut Self, EcsError>
    where
        T: Component + DeserializeOwned,
        A: InputArchive,
    {
        let section = std::any::type_name::<T>();
        let count = self.read_count(archive, section)?;
        let mut records: Vec<(Entity, T)> = Vec::with_capacity(count.min(PREALLOC_LIMIT));
        for n in 0..count {
            let entity = self.read_handle(archive, section, n)?;
            if !self.is_loaded(entity) {
                return Err(corrupt(
                    section,
                    format!("record {n} names {entity}, which was not restored"),
                ));
            }
            let value = archive
                .read_value::<T>()
                .map_err(|err| corrupt(section, format!("record {n} payload: {err}")))?;
            records.push((entity, value));
        }

        for (entity, value) in records {
            self.store.insert(entity, value)?;
        }
        tracing::debug!(section, count, "snapshot section loaded");
        Ok(self)
    }

    /// Destroy every entity that was alive before loading and was not
    /// restored. Returns how many were destroyed.
    pub fn orphans(&mut self) -> usize {
        let mut destroyed = 0;
        for &entity in &self.previously_alive {
            if self.loaded.get(&entity.index()) == Some(&entity) || !self.store.valid(entity) {
                continue;
            }
            if self.store.destroy(entity).is_ok() {
                destroyed += 1;
            }
        }
        tracing::debug!(count = destroyed, "orphans destroyed");
        destroyed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
