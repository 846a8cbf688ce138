//! Hierarchical object-store backend.
//!
//! Keys are `{owner}/{kind}/{id}` paths; values carry a generation counter in
//! an 8-byte header that plays the ETag role for conditional writes. All
//! conditional semantics ride on sled's `compare_and_swap`.

use crate::error::StorageError;
use crate::storage::{Expected, RecordKey, StorageProvider, VersionedRecord};
use crate::types::{BackendId, EntityKind};
use std::io;
use std::path::Path;

const RECORDS_TREE: &str = "records";
const ENVELOPE_HEADER: usize = 8;

/// Sled-backed implementation of the storage provider contract.
pub struct ObjectStore {
    db: sled::Db,
    records: sled::Tree,
}

impl ObjectStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(to_storage_io)?;
        let records = db.open_tree(RECORDS_TREE).map_err(to_storage_io)?;
        Ok(Self { db, records })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }
}

impl StorageProvider for ObjectStore {
    fn get(&self, key: &RecordKey) -> Result<Option<VersionedRecord>, StorageError> {
        let Some(raw) = self
            .records
            .get(key.path().as_bytes())
            .map_err(to_storage_io)?
        else {
            return Ok(None);
        };
        let (version, body) = decode_envelope(key, &raw)?;
        Ok(Some(VersionedRecord { version, body }))
    }

    fn put(&self, key: &RecordKey, body: Vec<u8>, expected: Expected) -> Result<u64, StorageError> {
        let key_bytes = key.path().into_bytes();
        loop {
            let current = self.records.get(&key_bytes).map_err(to_storage_io)?;
            let current_version = match &current {
                Some(raw) => decode_envelope(key, raw)?.0,
                None => 0,
            };

            match expected {
                Expected::Absent if current.is_some() => {
                    return Err(StorageError::AlreadyExists(key.path()));
                }
                Expected::Version(v) if v != current_version => {
                    return Err(StorageError::VersionConflict {
                        key: key.path(),
                        expected: v,
                        found: current_version,
                    });
                }
                _ => {}
            }

            let next_version = current_version + 1;
            let next = encode_envelope(next_version, &body);
            match self
                .records
                .compare_and_swap(&key_bytes, current, Some(next))
                .map_err(to_storage_io)?
            {
                Ok(()) => return Ok(next_version),
                // Lost the swap: unconditional writes re-read and retry,
                // conditional writes report the race to the caller.
                Err(_) if matches!(expected, Expected::Any) => continue,
                Err(cas) => {
                    let found = match cas.current.as_deref() {
                        Some(raw) => decode_envelope(key, raw)?.0,
                        None => 0,
                    };
                    return Err(match expected {
                        Expected::Absent => StorageError::AlreadyExists(key.path()),
                        Expected::Version(v) => StorageError::VersionConflict {
                            key: key.path(),
                            expected: v,
                            found,
                        },
                        Expected::Any => unreachable!("unconditional writes retry"),
                    });
                }
            }
        }
    }

    fn delete(&self, key: &RecordKey) -> Result<(), StorageError> {
        self.records
            .remove(key.path().as_bytes())
            .map_err(to_storage_io)?;
        Ok(())
    }

    fn list_by_prefix(
        &self,
        owner: &str,
        kind: EntityKind,
    ) -> Result<Vec<RecordKey>, StorageError> {
        let prefix = format!("{}/{}/", owner, kind.as_str());
        let mut keys = Vec::new();
        for item in self.records.scan_prefix(prefix.as_bytes()) {
            let (raw_key, _) = item.map_err(to_storage_io)?;
            let path = String::from_utf8(raw_key.to_vec())
                .map_err(|_| StorageError::InvalidKey("non-utf8 object key".to_string()))?;
            // Everything after the listed prefix is the record id.
            let id = path[prefix.len()..].to_string();
            keys.push(RecordKey::new(owner, kind, id));
        }
        Ok(keys)
    }

    fn probe(&self) -> Result<(), StorageError> {
        self.records
            .contains_key("probe".as_bytes())
            .map_err(to_storage_io)?;
        Ok(())
    }

    fn backend_id(&self) -> BackendId {
        BackendId::Object
    }
}

fn encode_envelope(version: u64, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENVELOPE_HEADER + body.len());
    buf.extend_from_slice(&version.to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

fn decode_envelope(key: &RecordKey, raw: &[u8]) -> Result<(u64, Vec<u8>), StorageError> {
    if raw.len() < ENVELOPE_HEADER {
        return Err(StorageError::CorruptRecord {
            key: key.path(),
            reason: "envelope shorter than version header".to_string(),
        });
    }
    let mut header = [0u8; ENVELOPE_HEADER];
    header.copy_from_slice(&raw[..ENVELOPE_HEADER]);
    Ok((u64::from_be_bytes(header), raw[ENVELOPE_HEADER..].to_vec()))
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, err.to_string()))
}
