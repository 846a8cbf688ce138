//! Entity Repositories
//!
//! One generic repository per entity type, parameterized at construction with
//! the storage provider its backend policy selected. Repositories translate
//! entity reads/writes into provider calls and own the bounded
//! read-transition-write retry cycle; they never cascade across entities.

pub mod factory;

pub use factory::{BackendHealth, RepositoryFactory};

use crate::entity::Entity;
use crate::error::{EngineError, StorageError};
use crate::storage::{Expected, RecordKey, StorageProvider, VersionedRecord};
use crate::types::{now, BackendId};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// How many times a lost conditional write is retried before the conflict is
/// surfaced to the caller. Each lost race implies another writer committed,
/// so the bound caps tolerated concurrent commits, not spin.
const CONFLICT_RETRY_LIMIT: usize = 32;

/// Listing options for `find_all` / `count`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub include_deleted: bool,
}

impl ListFilter {
    pub fn with_deleted() -> Self {
        ListFilter {
            include_deleted: true,
        }
    }
}

pub struct Repository<E: Entity> {
    provider: Arc<dyn StorageProvider>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Repository {
            provider,
            _marker: PhantomData,
        }
    }

    pub fn backend_id(&self) -> BackendId {
        self.provider.backend_id()
    }

    fn key(owner: &str, id: &str) -> RecordKey {
        RecordKey::new(owner, E::KIND, id)
    }

    fn decode(key: &RecordKey, record: &VersionedRecord) -> Result<E, StorageError> {
        serde_json::from_slice(&record.body).map_err(|e| StorageError::CorruptRecord {
            key: key.path(),
            reason: e.to_string(),
        })
    }

    fn encode(entity: &E) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(entity).map_err(|e| StorageError::CorruptRecord {
            key: Self::key(entity.owner(), entity.id()).path(),
            reason: e.to_string(),
        })
    }

    /// Fetch an entity with its storage version, tombstoned or not.
    fn load(&self, owner: &str, id: &str) -> Result<Option<(E, u64)>, EngineError> {
        let key = Self::key(owner, id);
        let Some(record) = self.provider.get(&key)? else {
            return Ok(None);
        };
        let entity = Self::decode(&key, &record)?;
        Ok(Some((entity, record.version)))
    }

    /// Non-tombstoned lookup.
    pub fn find_by_id(&self, owner: &str, id: &str) -> Result<Option<E>, EngineError> {
        Ok(self
            .load(owner, id)?
            .map(|(entity, _)| entity)
            .filter(|entity| !entity.is_deleted()))
    }

    /// Like `find_by_id`, but a miss (or tombstone) is an error.
    pub fn get(&self, owner: &str, id: &str) -> Result<E, EngineError> {
        self.find_by_id(owner, id)?
            .ok_or_else(|| EngineError::not_found(E::KIND, id))
    }

    pub fn find_all(&self, owner: &str, filter: &ListFilter) -> Result<Vec<E>, EngineError> {
        let mut entities = Vec::new();
        for key in self.provider.list_by_prefix(owner, E::KIND)? {
            let Some(record) = self.provider.get(&key)? else {
                // Deleted between listing and read; skip.
                continue;
            };
            let entity = Self::decode(&key, &record)?;
            if filter.include_deleted || !entity.is_deleted() {
                entities.push(entity);
            }
        }
        entities.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(entities)
    }

    pub fn count(&self, owner: &str, filter: &ListFilter) -> Result<usize, EngineError> {
        Ok(self.find_all(owner, filter)?.len())
    }

    /// Insert a new entity; the id must be unused.
    pub fn create(&self, entity: &E) -> Result<u64, EngineError> {
        let key = Self::key(entity.owner(), entity.id());
        match self.provider.put(&key, Self::encode(entity)?, Expected::Absent) {
            Ok(version) => Ok(version),
            Err(StorageError::AlreadyExists(_)) => Err(EngineError::Conflict {
                entity: key.path(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Unconditional full replacement; used for derived records that are
    /// recomputed wholesale (the program-level aggregate).
    pub fn replace(&self, entity: &E) -> Result<u64, EngineError> {
        let key = Self::key(entity.owner(), entity.id());
        Ok(self.provider.put(&key, Self::encode(entity)?, Expected::Any)?)
    }

    /// The read-transition-write cycle: load the current record, apply the
    /// mutation, write back conditionally, retry on lost races. `apply` runs
    /// against a fresh copy on every attempt and may reject the transition
    /// before anything is written.
    pub fn update_with<F>(&self, owner: &str, id: &str, mut apply: F) -> Result<E, EngineError>
    where
        F: FnMut(&mut E) -> Result<(), EngineError>,
    {
        let key = Self::key(owner, id);
        for attempt in 0..CONFLICT_RETRY_LIMIT {
            let (mut entity, version) = self
                .load(owner, id)?
                .ok_or_else(|| EngineError::not_found(E::KIND, id))?;
            apply(&mut entity)?;
            match self
                .provider
                .put(&key, Self::encode(&entity)?, Expected::Version(version))
            {
                Ok(_) => return Ok(entity),
                Err(StorageError::VersionConflict { .. }) => {
                    trace!(key = %key.path(), attempt, "conditional write lost, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Conflict {
            entity: key.path(),
        })
    }

    /// Tombstone; the record stays addressable through `load`/`find_all` with
    /// `include_deleted` but vanishes from ordinary reads.
    pub fn soft_delete(&self, owner: &str, id: &str) -> Result<(), EngineError> {
        self.update_with(owner, id, |entity| {
            if entity.deleted_at().is_none() {
                entity.set_deleted_at(Some(now()));
            }
            Ok(())
        })?;
        Ok(())
    }
}
