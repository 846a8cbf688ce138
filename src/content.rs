//! Content-template collaborator boundary.
//!
//! Templates are authored elsewhere; the engine consumes them read-only
//! through `ContentSource` and never writes back. The repository-backed
//! source layers a TTL'd read-through cache keyed by template id; the cache
//! is owned by the source instance, and the progression service never depends
//! on cache state for correctness.

use crate::entity::{Template, LIBRARY_OWNER};
use crate::error::EngineError;
use crate::repository::Repository;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn template(&self, id: &str) -> Result<Template, EngineError>;
}

/// Fixed in-memory template set, for fixtures and tests.
pub struct StaticContentSource {
    templates: HashMap<String, Template>,
}

impl StaticContentSource {
    pub fn new(templates: Vec<Template>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn template(&self, id: &str) -> Result<Template, EngineError> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::Content(format!("unknown template: {id}")))
    }
}

struct CacheSlot {
    template: Template,
    fetched_at: Instant,
}

/// Template source backed by the template repository with a read-through
/// cache. Entries expire after `ttl`; expired entries are refetched on the
/// next read rather than evicted in the background.
pub struct RepositoryContentSource {
    templates: Arc<Repository<Template>>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheSlot>>,
}

impl RepositoryContentSource {
    pub fn new(templates: Arc<Repository<Template>>, ttl: Duration) -> Self {
        Self {
            templates,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, id: &str) -> Option<Template> {
        let cache = self.cache.read();
        cache
            .get(id)
            .filter(|slot| slot.fetched_at.elapsed() < self.ttl)
            .map(|slot| slot.template.clone())
    }
}

#[async_trait]
impl ContentSource for RepositoryContentSource {
    async fn template(&self, id: &str) -> Result<Template, EngineError> {
        if let Some(template) = self.cached(id) {
            trace!(template = %id, "template cache hit");
            return Ok(template);
        }
        let template = self.templates.get(LIBRARY_OWNER, id)?;
        self.cache.write().insert(
            id.to_string(),
            CacheSlot {
                template: template.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(template)
    }
}
