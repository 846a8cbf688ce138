//! Shared identifiers and vocabulary for the progression engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Learning mode attached to templates and scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Pbl,
    Discovery,
    Assessment,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Pbl => "pbl",
            Mode::Discovery => "discovery",
            Mode::Assessment => "assessment",
        }
    }

    /// PBL keeps a single active scenario per (owner, template); Discovery
    /// and Assessment allow concurrent re-attempts.
    pub fn singleton_progress(self) -> bool {
        matches!(self, Mode::Pbl)
    }
}

/// Entity kinds understood by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Template,
    Scenario,
    Program,
    Task,
    Evaluation,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Template,
        EntityKind::Scenario,
        EntityKind::Program,
        EntityKind::Task,
        EntityKind::Evaluation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Template => "template",
            EntityKind::Scenario => "scenario",
            EntityKind::Program => "program",
            EntityKind::Task => "task",
            EntityKind::Evaluation => "evaluation",
        }
    }

    /// Table name used by the relational backend.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Template => "templates",
            EntityKind::Scenario => "scenarios",
            EntityKind::Program => "programs",
            EntityKind::Task => "tasks",
            EntityKind::Evaluation => "evaluations",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical storage backend identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Object,
    Relational,
}

impl BackendId {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendId::Object => "object",
            BackendId::Relational => "relational",
        }
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mint a fresh entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time, UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
