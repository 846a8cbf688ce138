//! Evaluator collaborator boundary.
//!
//! The engine treats evaluation as a pure call: a task's accumulated
//! interactions plus its competency codes in, scores and feedback out. The
//! collaborator's failures are propagated as `EvaluationUnavailable` and
//! never leave partial task state behind; retry policy belongs to the caller.

use crate::config::EvaluatorSettings;
use crate::entity::Interaction;
use crate::error::EngineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything the evaluator needs to score one task.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRequest<'a> {
    pub interactions: &'a [Interaction],
    pub domains: &'a [String],
    pub ksa_codes: &'a [String],
    pub language: &'a str,
}

/// What the evaluator returns for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub score: f64,
    pub max_score: f64,
    /// Domain code -> score in [0, 100].
    pub domain_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub rubric_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub feedback: serde_json::Value,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest<'_>)
        -> Result<EvaluationOutcome, EngineError>;
}

/// Reject outcomes that violate the scoring contract: every required domain
/// must be scored, and every domain score must stay in [0, 100]. An empty or
/// partial domain map on a scored task is a collaborator fault, not a valid
/// empty state.
pub fn validate_outcome(
    outcome: &EvaluationOutcome,
    required_domains: &[String],
) -> Result<(), EngineError> {
    for domain in required_domains {
        match outcome.domain_scores.get(domain) {
            None => {
                return Err(EngineError::EvaluationUnavailable(format!(
                    "evaluator omitted required domain '{domain}'"
                )));
            }
            Some(score) if !(0.0..=100.0).contains(score) => {
                return Err(EngineError::EvaluationUnavailable(format!(
                    "domain '{domain}' score {score} outside [0, 100]"
                )));
            }
            Some(_) => {}
        }
    }
    if outcome.max_score <= 0.0 {
        return Err(EngineError::EvaluationUnavailable(format!(
            "non-positive max score {}",
            outcome.max_score
        )));
    }
    Ok(())
}

const EVALUATOR_USER_AGENT: &str = concat!("stride/", env!("CARGO_PKG_VERSION"));

/// HTTP adapter for the evaluation service: one JSON POST per task.
#[derive(Debug)]
pub struct HttpEvaluator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEvaluator {
    pub fn new(settings: &EvaluatorSettings) -> Result<Self, EngineError> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| EngineError::Config("evaluator endpoint not configured".to_string()))?;
        let client = Client::builder()
            .user_agent(EVALUATOR_USER_AGENT)
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl Evaluator for HttpEvaluator {
    async fn evaluate(
        &self,
        request: EvaluationRequest<'_>,
    ) -> Result<EvaluationOutcome, EngineError> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EngineError::EvaluationUnavailable(format!(
                "evaluation service returned {status}: {error_text}"
            )));
        }

        response.json().await.map_err(|e| {
            EngineError::EvaluationUnavailable(format!("failed to parse evaluation response: {e}"))
        })
    }
}

fn map_http_error(error: reqwest::Error) -> EngineError {
    if error.is_timeout() {
        EngineError::EvaluationUnavailable(format!("evaluation request timed out: {error}"))
    } else if error.is_connect() {
        EngineError::EvaluationUnavailable(format!(
            "could not reach evaluation service: {error}"
        ))
    } else {
        EngineError::EvaluationUnavailable(format!("evaluation request failed: {error}"))
    }
}

// Scripted evaluator for unit tests.
#[cfg(test)]
pub(crate) struct MockEvaluator {
    outcomes: std::sync::Mutex<std::collections::VecDeque<Result<EvaluationOutcome, String>>>,
}

#[cfg(test)]
impl MockEvaluator {
    pub fn new(outcomes: Vec<Result<EvaluationOutcome, String>>) -> Self {
        Self {
            outcomes: std::sync::Mutex::new(outcomes.into()),
        }
    }

    pub fn scoring(domain_scores: &[(&str, f64)], score: f64, max_score: f64) -> EvaluationOutcome {
        EvaluationOutcome {
            score,
            max_score,
            domain_scores: domain_scores
                .iter()
                .map(|(d, s)| (d.to_string(), *s))
                .collect(),
            rubric_scores: BTreeMap::new(),
            feedback: serde_json::json!({"text": "mock feedback"}),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Evaluator for MockEvaluator {
    async fn evaluate(
        &self,
        _request: EvaluationRequest<'_>,
    ) -> Result<EvaluationOutcome, EngineError> {
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(EngineError::EvaluationUnavailable(message)),
            None => Err(EngineError::EvaluationUnavailable(
                "mock evaluator exhausted".to_string(),
            )),
        }
    }
}
