//! Immutable learning activity templates.
//!
//! Templates are authored outside the engine and consumed read-only. The
//! ordered blueprint list drives lazy task materialization; competency codes
//! are copied onto each task at creation time so in-flight runs are immune to
//! later template edits.

use crate::entity::Entity;
use crate::types::{EntityKind, Mode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared key namespace for templates; they are not learner data.
pub const LIBRARY_OWNER: &str = "library";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub mode: Mode,
    pub title: String,
    /// Ordered task blueprints; ordinal = position.
    pub blueprints: Vec<TaskBlueprint>,
    /// Question banks, populated for assessment templates.
    #[serde(default)]
    pub question_banks: Vec<QuestionBank>,
    /// Authoring-side revision tag, opaque to the engine.
    #[serde(default)]
    pub revision: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBlueprint {
    pub task_type: String,
    pub instructions: String,
    /// Competency domains this task is scored against.
    pub domains: Vec<String>,
    /// KSA codes mapped onto the task.
    #[serde(default)]
    pub ksa_codes: Vec<String>,
    #[serde(default)]
    pub question_bank: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBank {
    pub id: String,
    #[serde(default)]
    pub domain: Option<String>,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub answer: Option<usize>,
}

impl Template {
    pub fn blueprint(&self, ordinal: u32) -> Option<&TaskBlueprint> {
        self.blueprints.get(ordinal as usize)
    }

    pub fn task_count(&self) -> u32 {
        self.blueprints.len() as u32
    }

    pub fn question_bank(&self, id: &str) -> Option<&QuestionBank> {
        self.question_banks.iter().find(|b| b.id == id)
    }
}

impl Entity for Template {
    const KIND: EntityKind = EntityKind::Template;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &str {
        LIBRARY_OWNER
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }
}
