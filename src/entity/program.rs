//! Programs: one attempt/run within a scenario, owning an ordered task set.

use crate::entity::{Entity, Scenario};
use crate::types::{new_id, now, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Pending,
    Active,
    Completed,
    Skipped,
}

impl ProgramStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramStatus::Pending => "pending",
            ProgramStatus::Active => "active",
            ProgramStatus::Completed => "completed",
            ProgramStatus::Skipped => "skipped",
        }
    }

    pub fn can_transition(self, to: ProgramStatus) -> bool {
        use ProgramStatus::*;
        matches!(
            (self, to),
            (Pending, Active) | (Active, Completed) | (Active, Skipped) | (Pending, Skipped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProgramStatus::Completed | ProgramStatus::Skipped)
    }
}

/// Free-form run configuration carried by a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSettings {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub difficulty: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for ProgramSettings {
    fn default() -> Self {
        ProgramSettings {
            language: default_language(),
            difficulty: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub owner: String,
    pub scenario: String,
    /// Attempt index within the scenario, starting at 0.
    pub ordinal: u32,
    pub status: ProgramStatus,
    /// Recomputed from a live task count, never independently incremented.
    pub completed_tasks: u32,
    pub total_tasks: u32,
    #[serde(default)]
    pub settings: ProgramSettings,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Program {
    pub fn new(
        scenario: &Scenario,
        ordinal: u32,
        total_tasks: u32,
        settings: ProgramSettings,
    ) -> Self {
        Program {
            id: new_id(),
            owner: scenario.owner.clone(),
            scenario: scenario.id.clone(),
            ordinal,
            status: ProgramStatus::Pending,
            completed_tasks: 0,
            total_tasks,
            settings,
            created_at: now(),
            started_at: None,
            completed_at: None,
            deleted_at: None,
        }
    }
}

impl Entity for Program {
    const KIND: EntityKind = EntityKind::Program;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }
}
