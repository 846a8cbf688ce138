//! Repository Factory
//!
//! Resolves the static entity-to-backend policy once at construction, hands
//! each repository the provider matching its configured backend, and exposes
//! a health check across every distinct backend actually in use. Backend
//! changes require a process restart; there is no re-resolution.

use crate::config::StrideConfig;
use crate::entity::{Evaluation, Program, Scenario, Task, Template};
use crate::error::{EngineError, StorageError};
use crate::repository::Repository;
use crate::storage::{ObjectStore, RelationalStore, StorageProvider};
use crate::types::{BackendId, EntityKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reachability report for one physical backend.
#[derive(Debug, Clone)]
pub struct BackendHealth {
    pub backend: BackendId,
    pub reachable: bool,
    pub detail: Option<String>,
}

pub struct RepositoryFactory {
    providers: HashMap<BackendId, Arc<dyn StorageProvider>>,
    templates: Arc<Repository<Template>>,
    scenarios: Arc<Repository<Scenario>>,
    programs: Arc<Repository<Program>>,
    tasks: Arc<Repository<Task>>,
    evaluations: Arc<Repository<Evaluation>>,
}

impl RepositoryFactory {
    pub fn new(config: &StrideConfig) -> Result<Self, EngineError> {
        // Open only the backends the policy actually references.
        let mut providers: HashMap<BackendId, Arc<dyn StorageProvider>> = HashMap::new();
        for kind in EntityKind::ALL {
            let backend = config.backends.backend_for(kind);
            if !providers.contains_key(&backend) {
                providers.insert(backend, build_provider(backend, config)?);
            }
            debug!(kind = %kind, backend = %backend, "resolved repository backend");
        }

        let provider = |kind: EntityKind| -> Arc<dyn StorageProvider> {
            providers[&config.backends.backend_for(kind)].clone()
        };
        let templates = Arc::new(Repository::new(provider(EntityKind::Template)));
        let scenarios = Arc::new(Repository::new(provider(EntityKind::Scenario)));
        let programs = Arc::new(Repository::new(provider(EntityKind::Program)));
        let tasks = Arc::new(Repository::new(provider(EntityKind::Task)));
        let evaluations = Arc::new(Repository::new(provider(EntityKind::Evaluation)));

        Ok(Self {
            providers,
            templates,
            scenarios,
            programs,
            tasks,
            evaluations,
        })
    }

    pub fn templates(&self) -> Arc<Repository<Template>> {
        self.templates.clone()
    }

    pub fn scenarios(&self) -> Arc<Repository<Scenario>> {
        self.scenarios.clone()
    }

    pub fn programs(&self) -> Arc<Repository<Program>> {
        self.programs.clone()
    }

    pub fn tasks(&self) -> Arc<Repository<Task>> {
        self.tasks.clone()
    }

    pub fn evaluations(&self) -> Arc<Repository<Evaluation>> {
        self.evaluations.clone()
    }

    /// Probe every distinct backend in use and report per-backend
    /// reachability. Never assumes a single backend for the whole process.
    pub fn health_check(&self) -> Vec<BackendHealth> {
        let mut report: Vec<BackendHealth> = self
            .providers
            .iter()
            .map(|(backend, provider)| match provider.probe() {
                Ok(()) => BackendHealth {
                    backend: *backend,
                    reachable: true,
                    detail: None,
                },
                Err(err) => {
                    warn!(backend = %backend, error = %err, "backend probe failed");
                    BackendHealth {
                        backend: *backend,
                        reachable: false,
                        detail: Some(err.to_string()),
                    }
                }
            })
            .collect();
        report.sort_by_key(|h| h.backend.as_str());
        report
    }
}

fn build_provider(
    backend: BackendId,
    config: &StrideConfig,
) -> Result<Arc<dyn StorageProvider>, EngineError> {
    let open_err = |path: &std::path::Path, err: StorageError| {
        EngineError::Config(format!(
            "failed to open {backend} backend at {}: {err}",
            path.display()
        ))
    };
    let provider: Arc<dyn StorageProvider> = match backend {
        BackendId::Object => {
            let path = &config.storage.object_root;
            Arc::new(ObjectStore::open(path).map_err(|e| open_err(path, e))?)
        }
        BackendId::Relational => {
            let path = &config.storage.relational_path;
            Arc::new(RelationalStore::open(path).map_err(|e| open_err(path, e))?)
        }
    };
    Ok(provider)
}
