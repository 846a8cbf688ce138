//! Shared fixtures for integration tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use stride::config::{BackendPolicy, StorageSettings, StrideConfig};
use stride::content::StaticContentSource;
use stride::entity::{TaskBlueprint, Template};
use stride::error::EngineError;
use stride::evaluator::{EvaluationOutcome, EvaluationRequest, Evaluator};
use stride::progression::ProgressionService;
use stride::repository::RepositoryFactory;
use stride::types::{now, Mode};
use tempfile::TempDir;

pub const OWNER: &str = "learner-1";

/// Evaluator that pops scripted results in order; an exhausted script fails
/// the same way an unreachable service would.
pub struct ScriptedEvaluator {
    outcomes: Mutex<VecDeque<Result<EvaluationOutcome, String>>>,
}

impl ScriptedEvaluator {
    pub fn new(outcomes: Vec<Result<EvaluationOutcome, String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
        }
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _request: EvaluationRequest<'_>,
    ) -> Result<EvaluationOutcome, EngineError> {
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(EngineError::EvaluationUnavailable(message)),
            None => Err(EngineError::EvaluationUnavailable(
                "scripted evaluator exhausted".to_string(),
            )),
        }
    }
}

/// A fully wired engine over temporary storage.
pub struct TestEngine {
    pub service: Arc<ProgressionService>,
    pub repos: Arc<RepositoryFactory>,
    _dir: TempDir,
}

pub fn engine(
    templates: Vec<Template>,
    outcomes: Vec<Result<EvaluationOutcome, String>>,
) -> TestEngine {
    engine_with_policy(templates, outcomes, BackendPolicy::default())
}

pub fn engine_with_policy(
    templates: Vec<Template>,
    outcomes: Vec<Result<EvaluationOutcome, String>>,
    policy: BackendPolicy,
) -> TestEngine {
    let dir = TempDir::new().unwrap();
    let config = StrideConfig {
        storage: StorageSettings {
            object_root: dir.path().join("objects"),
            relational_path: dir.path().join("stride.db"),
        },
        backends: policy,
        ..Default::default()
    };
    let repos = Arc::new(RepositoryFactory::new(&config).unwrap());
    let service = Arc::new(ProgressionService::new(
        repos.clone(),
        Arc::new(StaticContentSource::new(templates)),
        Arc::new(ScriptedEvaluator::new(outcomes)),
    ));
    TestEngine {
        service,
        repos,
        _dir: dir,
    }
}

/// A template with one blueprint per entry; each entry lists the blueprint's
/// competency domains.
pub fn template(id: &str, mode: Mode, domains_per_task: &[&[&str]]) -> Template {
    Template {
        id: id.to_string(),
        mode,
        title: format!("fixture {id}"),
        blueprints: domains_per_task
            .iter()
            .enumerate()
            .map(|(i, domains)| TaskBlueprint {
                task_type: "dialogue".to_string(),
                instructions: format!("step {i}"),
                domains: domains.iter().map(|d| d.to_string()).collect(),
                ksa_codes: vec!["K1".to_string()],
                question_bank: None,
            })
            .collect(),
        question_banks: vec![],
        revision: None,
        created_at: now(),
        deleted_at: None,
    }
}

pub fn outcome(domains: &[(&str, f64)], score: f64, max_score: f64) -> EvaluationOutcome {
    EvaluationOutcome {
        score,
        max_score,
        domain_scores: domains.iter().map(|(d, s)| (d.to_string(), *s)).collect(),
        rubric_scores: Default::default(),
        feedback: serde_json::json!({"text": "scripted feedback"}),
    }
}
