//! Entity contracts shared by every persisted type.
//!
//! An entity knows its kind, id, and the owner component of its storage key;
//! deletion is always a tombstone, never physical removal.

pub mod evaluation;
pub mod program;
pub mod scenario;
pub mod task;
pub mod template;

pub use evaluation::{Evaluation, EvaluationSubject};
pub use program::{Program, ProgramSettings, ProgramStatus};
pub use scenario::{Scenario, ScenarioStatus};
pub use task::{Actor, Interaction, Task, TaskStatus};
pub use template::{Question, QuestionBank, TaskBlueprint, Template, LIBRARY_OWNER};

use crate::types::EntityKind;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Persisted entity contract.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Root of this entity's storage key. Learner-owned entities use the
    /// learner id; templates live under the shared library namespace;
    /// evaluations are keyed under the entity they score.
    fn owner(&self) -> &str;

    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}
