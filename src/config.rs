//! Configuration System
//!
//! Layered configuration: a TOML file plus `STRIDE_`-prefixed environment
//! overrides, with serde defaults throughout so a missing or empty file still
//! yields a runnable engine. The entity-to-backend map is read once at process
//! start; changing it requires a restart.

use crate::error::EngineError;
use crate::logging::LoggingConfig;
use crate::types::{BackendId, EntityKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StrideConfig {
    /// Storage backend locations
    #[serde(default)]
    pub storage: StorageSettings,

    /// Per-entity backend selection
    #[serde(default)]
    pub backends: BackendPolicy,

    /// Evaluator collaborator endpoint
    #[serde(default)]
    pub evaluator: EvaluatorSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Physical locations for the two storage backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory of the hierarchical object store
    #[serde(default = "default_object_root")]
    pub object_root: PathBuf,

    /// Path of the relational database file
    #[serde(default = "default_relational_path")]
    pub relational_path: PathBuf,
}

fn default_object_root() -> PathBuf {
    PathBuf::from(".stride/objects")
}

fn default_relational_path() -> PathBuf {
    PathBuf::from(".stride/stride.db")
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            object_root: default_object_root(),
            relational_path: default_relational_path(),
        }
    }
}

/// Static entity-to-backend selection map.
///
/// The default splits along access patterns: document-shaped records with
/// embedded logs (tasks, evaluations, templates) go to the object store;
/// row-shaped lifecycle records (scenarios, programs) go to the relational
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendPolicy {
    #[serde(default = "object_backend")]
    pub template: BackendId,
    #[serde(default = "relational_backend")]
    pub scenario: BackendId,
    #[serde(default = "relational_backend")]
    pub program: BackendId,
    #[serde(default = "object_backend")]
    pub task: BackendId,
    #[serde(default = "object_backend")]
    pub evaluation: BackendId,
}

fn object_backend() -> BackendId {
    BackendId::Object
}

fn relational_backend() -> BackendId {
    BackendId::Relational
}

impl Default for BackendPolicy {
    fn default() -> Self {
        BackendPolicy {
            template: object_backend(),
            scenario: relational_backend(),
            program: relational_backend(),
            task: object_backend(),
            evaluation: object_backend(),
        }
    }
}

impl BackendPolicy {
    pub fn backend_for(&self, kind: EntityKind) -> BackendId {
        match kind {
            EntityKind::Template => self.template,
            EntityKind::Scenario => self.scenario,
            EntityKind::Program => self.program,
            EntityKind::Task => self.task,
            EntityKind::Evaluation => self.evaluation,
        }
    }
}

/// Evaluator collaborator endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorSettings {
    /// Base URL of the evaluation service; unset means no HTTP evaluator can
    /// be constructed (tests inject their own).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token, if the service requires one
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        EvaluatorSettings {
            endpoint: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Loads configuration from an optional file path plus the environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from the given file (or `stride.toml` in the working directory if
    /// none is given), then apply `STRIDE_`-prefixed environment overrides.
    /// Nested keys use `__` as the separator, e.g.
    /// `STRIDE_STORAGE__OBJECT_ROOT=/var/lib/stride/objects`.
    pub fn load(path: Option<&Path>) -> Result<StrideConfig, EngineError> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("stride").required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix("STRIDE")
                .prefix_separator("_")
                .separator("__"),
        );
        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }
}
