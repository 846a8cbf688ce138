//! Storage Provider Abstraction
//!
//! A uniform key/record contract implemented once per physical backend.
//! Repositories receive a provider instance at construction time and never
//! learn which backend they are talking to; conditional writes are the only
//! concurrency primitive the engine relies on.

pub mod object;
pub mod relational;

pub use object::ObjectStore;
pub use relational::RelationalStore;

use crate::error::StorageError;
use crate::types::{BackendId, EntityKind};

/// Storage key rooted at the owning identity.
///
/// Rendered as the `{owner}/{kind}/{id}` path on hierarchical backends;
/// relational backends map the same coordinates onto (table, primary key,
/// owner index).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub owner: String,
    pub kind: EntityKind,
    pub id: String,
}

impl RecordKey {
    pub fn new(owner: impl Into<String>, kind: EntityKind, id: impl Into<String>) -> Self {
        RecordKey {
            owner: owner.into(),
            kind,
            id: id.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.owner, self.kind.as_str(), self.id)
    }
}

/// Version expectation for conditional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Unconditional write; still atomic, last writer wins.
    Any,
    /// The record must not exist yet.
    Absent,
    /// The stored version must match exactly.
    Version(u64),
}

/// A record body together with its storage version.
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    pub version: u64,
    pub body: Vec<u8>,
}

/// Uniform key/record storage contract, implemented once per physical backend.
///
/// `put` with `Expected::Version`/`Expected::Absent` fails with
/// `StorageError::VersionConflict`/`StorageError::AlreadyExists` when the
/// stored state no longer matches; callers own the read-transition-write
/// retry cycle.
pub trait StorageProvider: Send + Sync {
    fn get(&self, key: &RecordKey) -> Result<Option<VersionedRecord>, StorageError>;

    /// Write `body` under `key`, returning the new version.
    fn put(&self, key: &RecordKey, body: Vec<u8>, expected: Expected) -> Result<u64, StorageError>;

    /// Physical removal. Repositories expose only soft deletes; this exists
    /// for retention tooling and tests.
    fn delete(&self, key: &RecordKey) -> Result<(), StorageError>;

    fn list_by_prefix(&self, owner: &str, kind: EntityKind) -> Result<Vec<RecordKey>, StorageError>;

    /// Cheap reachability probe used by factory health checks.
    fn probe(&self) -> Result<(), StorageError>;

    fn backend_id(&self) -> BackendId;
}
