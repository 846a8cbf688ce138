//! Relational storage backend.
//!
//! One table per entity kind, keyed by id with an owner index. The version
//! column is the row update counter backing conditional writes: a conditional
//! update that matches zero rows lost the race.

use crate::error::StorageError;
use crate::storage::{Expected, RecordKey, StorageProvider, VersionedRecord};
use crate::types::{BackendId, EntityKind};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::io;
use std::path::Path;

/// Rusqlite-backed implementation of the storage provider contract.
pub struct RelationalStore {
    conn: Mutex<Connection>,
}

impl RelationalStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(to_storage)?;
        Self::with_connection(conn)
    }

    /// In-memory database, primarily for tests.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(to_storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(to_storage)?;
        for kind in EntityKind::ALL {
            let table = kind.table();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                     id TEXT PRIMARY KEY,
                     owner TEXT NOT NULL,
                     version INTEGER NOT NULL,
                     body BLOB NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner);"
            ))
            .map_err(to_storage)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl StorageProvider for RelationalStore {
    fn get(&self, key: &RecordKey) -> Result<Option<VersionedRecord>, StorageError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT version, body FROM {} WHERE id = ?1 AND owner = ?2",
            key.kind.table()
        );
        conn.query_row(&sql, params![key.id, key.owner], |row| {
            Ok(VersionedRecord {
                version: row.get::<_, i64>(0)? as u64,
                body: row.get(1)?,
            })
        })
        .optional()
        .map_err(to_storage)
    }

    fn put(&self, key: &RecordKey, body: Vec<u8>, expected: Expected) -> Result<u64, StorageError> {
        let table = key.kind.table();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(to_storage)?;

        let current: Option<u64> = tx
            .query_row(
                &format!("SELECT version FROM {table} WHERE id = ?1 AND owner = ?2"),
                params![key.id, key.owner],
                |row| row.get::<_, i64>(0).map(|v| v as u64),
            )
            .optional()
            .map_err(to_storage)?;

        match (expected, current) {
            (Expected::Absent, Some(_)) => {
                return Err(StorageError::AlreadyExists(key.path()));
            }
            (Expected::Version(v), found) if found.unwrap_or(0) != v => {
                return Err(StorageError::VersionConflict {
                    key: key.path(),
                    expected: v,
                    found: found.unwrap_or(0),
                });
            }
            _ => {}
        }

        let next_version = current.unwrap_or(0) + 1;
        match current {
            Some(version) => {
                let changed = tx
                    .execute(
                        &format!(
                            "UPDATE {table} SET version = ?1, body = ?2
                             WHERE id = ?3 AND owner = ?4 AND version = ?5"
                        ),
                        params![next_version as i64, body, key.id, key.owner, version as i64],
                    )
                    .map_err(to_storage)?;
                if changed == 0 {
                    // Row moved underneath us inside the transaction window.
                    return Err(StorageError::VersionConflict {
                        key: key.path(),
                        expected: version,
                        found: 0,
                    });
                }
            }
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO {table} (id, owner, version, body) VALUES (?1, ?2, ?3, ?4)"
                    ),
                    params![key.id, key.owner, next_version as i64, body],
                )
                .map_err(to_storage)?;
            }
        }
        tx.commit().map_err(to_storage)?;
        Ok(next_version)
    }

    fn delete(&self, key: &RecordKey) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE id = ?1 AND owner = ?2",
                key.kind.table()
            ),
            params![key.id, key.owner],
        )
        .map_err(to_storage)?;
        Ok(())
    }

    fn list_by_prefix(
        &self,
        owner: &str,
        kind: EntityKind,
    ) -> Result<Vec<RecordKey>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id FROM {} WHERE owner = ?1 ORDER BY id",
                kind.table()
            ))
            .map_err(to_storage)?;
        let rows = stmt
            .query_map(params![owner], |row| row.get::<_, String>(0))
            .map_err(to_storage)?;

        let mut keys = Vec::new();
        for id in rows {
            keys.push(RecordKey::new(owner, kind, id.map_err(to_storage)?));
        }
        Ok(keys)
    }

    fn probe(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(to_storage)?;
        Ok(())
    }

    fn backend_id(&self) -> BackendId {
        BackendId::Relational
    }
}

fn to_storage(err: rusqlite::Error) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, err.to_string()))
}
