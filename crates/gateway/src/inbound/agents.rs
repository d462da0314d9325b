//! TTL cache over per-project agent configuration.
//!
//! Inbound routing touches the agent config on every message; the cache
//! keeps hot paths off the project store. Entries expire after the TTL
//! and are invalidated explicitly on project mutations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use nexus_domain::error::Result;
use nexus_domain::project::AgentConfig;
use nexus_store::ProjectStore;

pub const DEFAULT_AGENT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Routes an inbound message to a named agent. The resolved agent id is
/// stamped into the session metadata and may drive tool allowlists and
/// prompt overrides. The default router resolves nothing — the project's
/// own agent config applies.
pub trait AgentRouter: Send + Sync {
    fn route(&self, project_id: &str, channel: &str, contact_role: Option<&str>) -> Option<String>;
}

/// Always falls through to the project's embedded agent config.
pub struct DefaultAgentRouter;

impl AgentRouter for DefaultAgentRouter {
    fn route(
        &self,
        _project_id: &str,
        _channel: &str,
        _contact_role: Option<&str>,
    ) -> Option<String> {
        None
    }
}

struct CachedConfig {
    config: AgentConfig,
    fetched_at: Instant,
}

pub struct AgentConfigCache {
    projects: Arc<ProjectStore>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedConfig>>,
}

impl AgentConfigCache {
    pub fn new(projects: Arc<ProjectStore>, ttl: Duration) -> Self {
        Self {
            projects,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a project's agent config, served from cache within the TTL.
    pub async fn get(&self, project_id: &str) -> Result<AgentConfig> {
        if let Some(cached) = self.entries.read().get(project_id) {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.config.clone());
            }
        }

        let project = self.projects.get(project_id).await?;
        let config = project.agent_config;
        self.entries.write().insert(
            project_id.to_string(),
            CachedConfig {
                config: config.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(config)
    }

    /// Drop a cached entry after a project mutation.
    pub fn invalidate(&self, project_id: &str) {
        self.entries.write().remove(project_id);
    }

    /// Re-read from the store, replacing the cached entry.
    pub async fn refresh(&self, project_id: &str) -> Result<AgentConfig> {
        self.invalidate(project_id);
        self.get(project_id).await
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
