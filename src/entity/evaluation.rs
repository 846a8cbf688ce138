//! Evaluations: scored outcomes attached to a task or a program.
//!
//! Task-level evaluations are immutable once created; re-evaluation appends a
//! new record. The program-level aggregate uses the program id as its own id,
//! so each recomputation replaces the whole record in place.

use crate::entity::Entity;
use crate::types::{new_id, now, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The entity an evaluation scores. Doubles as the storage-key owner, so
/// evaluations are reachable only through the task or program they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum EvaluationSubject {
    Task(String),
    Program(String),
}

impl EvaluationSubject {
    pub fn id(&self) -> &str {
        match self {
            EvaluationSubject::Task(id) | EvaluationSubject::Program(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub subject: EvaluationSubject,
    pub score: f64,
    pub max_score: f64,
    /// Domain code -> score in [0, 100]. Covers every domain the scored task
    /// declares; a partial map is rejected before the record is written.
    pub domain_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub rubric_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub feedback: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    pub fn for_task(
        task_id: &str,
        score: f64,
        max_score: f64,
        domain_scores: BTreeMap<String, f64>,
        rubric_scores: BTreeMap<String, f64>,
        feedback: serde_json::Value,
    ) -> Self {
        Evaluation {
            id: new_id(),
            subject: EvaluationSubject::Task(task_id.to_string()),
            score,
            max_score,
            domain_scores,
            rubric_scores,
            feedback,
            created_at: now(),
            deleted_at: None,
        }
    }

    /// Program aggregate: id is the program id, so recomputation overwrites
    /// the previous aggregate instead of accumulating records.
    pub fn for_program(
        program_id: &str,
        score: f64,
        max_score: f64,
        domain_scores: BTreeMap<String, f64>,
        rubric_scores: BTreeMap<String, f64>,
        feedback: serde_json::Value,
    ) -> Self {
        Evaluation {
            id: program_id.to_string(),
            subject: EvaluationSubject::Program(program_id.to_string()),
            score,
            max_score,
            domain_scores,
            rubric_scores,
            feedback,
            created_at: now(),
            deleted_at: None,
        }
    }
}

impl Entity for Evaluation {
    const KIND: EntityKind = EntityKind::Evaluation;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &str {
        self.subject.id()
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }
}
