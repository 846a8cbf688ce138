//! Error types for the learning progression engine.

use crate::types::EntityKind;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("version conflict on {key}: expected {expected}, found {found}")]
    VersionConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::VersionConflict { .. } | StorageError::AlreadyExists(_)
        )
    }
}

/// Engine-level errors surfaced to callers.
///
/// `Conflict` and `EvaluationUnavailable` mean "try again"; the rest mean the
/// request itself is invalid against current state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("conflicting writes on {entity}: retries exhausted")]
    Conflict { entity: String },

    #[error("scenario {scenario} already has active program {active}")]
    AlreadyActive { scenario: String, active: String },

    #[error("illegal {kind} operation for {id}: cannot {op} from {from}")]
    InvalidTransition {
        kind: EntityKind,
        id: String,
        op: &'static str,
        from: String,
    },

    #[error("evaluation unavailable: {0}")]
    EvaluationUnavailable(String),

    #[error("template source error: {0}")]
    Content(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether retrying the same logical operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Conflict { .. } | EngineError::EvaluationUnavailable(_)
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}
