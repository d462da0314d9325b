//! ProjectStore — tenant roots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;

use nexus_domain::error::{Error, Result};
use nexus_domain::project::Project;

use crate::persist;

pub struct ProjectStore {
    inner: RwLock<HashMap<String, Project>>,
    persist_path: PathBuf,
}

impl ProjectStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("projects.json");
        let items: Vec<Project> = persist::load_items(&persist_path);
        let mut map = HashMap::new();
        for p in items {
            map.insert(p.id.clone(), p);
        }
        if !map.is_empty() {
            tracing::info!(count = map.len(), "loaded projects from disk");
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items: Vec<Project> = self.inner.read().await.values().cloned().collect();
        persist::save_items(&self.persist_path, &items).await;
    }

    pub async fn insert(&self, project: Project) -> Result<Project> {
        {
            let mut map = self.inner.write().await;
            if map.contains_key(&project.id) {
                return Err(Error::Validation(format!(
                    "project '{}' already exists",
                    project.id
                )));
            }
            map.insert(project.id.clone(), project.clone());
        }
        self.persist().await;
        Ok(project)
    }

    pub async fn get(&self, id: &str) -> Result<Project> {
        self.inner
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("project '{id}'")))
    }

    pub async fn list(&self) -> Vec<Project> {
        let mut items: Vec<Project> = self.inner.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    pub async fn update(&self, id: &str, f: impl FnOnce(&mut Project)) -> Result<Project> {
        let updated = {
            let mut map = self.inner.write().await;
            let project = map
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("project '{id}'")))?;
            f(project);
            project.updated_at = Utc::now();
            project.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    /// Delete a project. The caller enforces the no-live-sessions rule.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self.inner.write().await.remove(id).is_some();
        if !removed {
            return Err(Error::NotFound(format!("project '{id}'")));
        }
        self.persist().await;
        Ok(())
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_domain::project::{AgentConfig, ProviderSpec};

    pub(crate) fn test_project(id: &str) -> Project {
        Project {
            id: id.into(),
            name: format!("{id} name"),
            owner: "ops".into(),
            environment: Default::default(),
            tags: vec![],
            agent_config: AgentConfig {
                provider: ProviderSpec {
                    provider: "anthropic".into(),
                    model: "claude-sonnet-4-20250514".into(),
                    api_key_env_var: "ANTHROPIC_API_KEY".into(),
                    base_url: None,
                    temperature: None,
                    max_tokens: 4096,
                },
                failover: Default::default(),
                allowed_tools: vec![],
                memory: Default::default(),
                cost: Default::default(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_get_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());

        store.insert(test_project("P1")).await.unwrap();
        assert_eq!(store.get("P1").await.unwrap().owner, "ops");

        store
            .update("P1", |p| p.name = "renamed".into())
            .await
            .unwrap();
        assert_eq!(store.get("P1").await.unwrap().name, "renamed");

        store.delete("P1").await.unwrap();
        assert!(store.get("P1").await.is_err());
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.insert(test_project("P1")).await.unwrap();
        let err = store.insert(test_project("P1")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ProjectStore::new(dir.path());
            store.insert(test_project("P1")).await.unwrap();
        }
        let store = ProjectStore::new(dir.path());
        assert_eq!(store.count().await, 1);
        assert!(store.get("P1").await.is_ok());
    }
}
