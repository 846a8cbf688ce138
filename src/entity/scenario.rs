//! Learner scenarios: one learner's binding to a template.

use crate::entity::{Entity, Template};
use crate::types::{new_id, now, EntityKind, Mode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Created,
    Active,
    Completed,
    Abandoned,
}

impl ScenarioStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioStatus::Created => "created",
            ScenarioStatus::Active => "active",
            ScenarioStatus::Completed => "completed",
            ScenarioStatus::Abandoned => "abandoned",
        }
    }

    /// Legal transitions; `Active -> Active` is the idempotent re-entry case.
    pub fn can_transition(self, to: ScenarioStatus) -> bool {
        use ScenarioStatus::*;
        matches!(
            (self, to),
            (Created, Active) | (Active, Active) | (Active, Completed) | (Active, Abandoned)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub owner: String,
    pub template: String,
    pub mode: Mode,
    pub status: ScenarioStatus,
    /// At most one active program per scenario; claimed by conditional write.
    #[serde(default)]
    pub active_program: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Scenario {
    pub fn new(owner: &str, template: &Template) -> Self {
        let created = now();
        Scenario {
            id: new_id(),
            owner: owner.to_string(),
            template: template.id.clone(),
            mode: template.mode,
            status: ScenarioStatus::Created,
            active_program: None,
            created_at: created,
            last_active_at: created,
            deleted_at: None,
        }
    }
}

impl Entity for Scenario {
    const KIND: EntityKind = EntityKind::Scenario;

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
