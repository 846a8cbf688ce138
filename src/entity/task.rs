//! Tasks: one unit of work inside a program, accumulating an interaction log.
//!
//! Tasks are materialized lazily (the first when its program activates, each
//! successor when the prior task reaches a terminal state) and carry the
//! competency codes copied from the template blueprint at creation time.

use crate::entity::{Entity, Program, TaskBlueprint};
use crate::types::{now, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn can_transition(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Active) | (Active, Completed) | (Active, Skipped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

/// Who produced an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Learner,
    Evaluator,
}

/// One entry in a task's append-only interaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub actor: Actor,
    pub content: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner: String,
    pub program: String,
    /// Position within the program; contiguous from 0.
    pub ordinal: u32,
    pub task_type: String,
    pub instructions: String,
    /// Competency domains copied from the blueprint at materialization time.
    pub domains: Vec<String>,
    #[serde(default)]
    pub ksa_codes: Vec<String>,
    pub status: TaskStatus,
    /// Append-only; mutated solely through the conditional-write protocol.
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub interaction_count: u32,
    /// Evaluation recorded at completion; the idempotency witness.
    #[serde(default)]
    pub evaluation: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Deterministic task id: one slot per (program, ordinal), so concurrent
    /// materialization attempts collide on create instead of duplicating.
    pub fn slot_id(program_id: &str, ordinal: u32) -> String {
        format!("{program_id}-{ordinal}")
    }

    /// Build a pending task from a template blueprint, copying competency
    /// codes so later template edits never touch in-flight runs.
    pub fn materialize(program: &Program, ordinal: u32, blueprint: &TaskBlueprint) -> Self {
        Task {
            id: Task::slot_id(&program.id, ordinal),
            owner: program.owner.clone(),
            program: program.id.clone(),
            ordinal,
            task_type: blueprint.task_type.clone(),
            instructions: blueprint.instructions.clone(),
            domains: blueprint.domains.clone(),
            ksa_codes: blueprint.ksa_codes.clone(),
            status: TaskStatus::Pending,
            interactions: Vec::new(),
            interaction_count: 0,
            evaluation: None,
            created_at: now(),
            activated_at: None,
            completed_at: None,
            deleted_at: None,
        }
    }

    pub fn record_interaction(&mut self, actor: Actor, content: serde_json::Value) {
        self.interactions.push(Interaction {
            actor,
            content,
            at: now(),
        });
        self.interaction_count = self.interactions.len() as u32;
    }
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Task;

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
