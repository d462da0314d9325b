//! TraceStore — execution traces, immutable after finalize.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::error::{Error, Result};
use nexus_domain::trace::ExecutionTrace;

use crate::persist;

pub struct TraceStore {
    inner: RwLock<HashMap<Uuid, ExecutionTrace>>,
    persist_path: PathBuf,
}

impl TraceStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("traces.json");
        let items: Vec<ExecutionTrace> = persist::load_items(&persist_path);
        let mut map = HashMap::new();
        for t in items {
            map.insert(t.id, t);
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items: Vec<ExecutionTrace> = self.inner.read().await.values().cloned().collect();
        persist::save_items(&self.persist_path, &items).await;
    }

    /// Persist a finalized trace atomically. Traces are append-only: a
    /// second insert with the same id is rejected.
    pub async fn insert(&self, trace: ExecutionTrace) -> Result<()> {
        {
            let mut map = self.inner.write().await;
            if map.contains_key(&trace.id) {
                return Err(Error::Validation(format!(
                    "trace {} already persisted",
                    trace.id
                )));
            }
            map.insert(trace.id, trace);
        }
        self.persist().await;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<ExecutionTrace> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("trace {id}")))
    }

    pub async fn list_by_session(&self, session_id: Uuid) -> Vec<ExecutionTrace> {
        let mut items: Vec<ExecutionTrace> = self
            .inner
            .read()
            .await
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    pub async fn count_for_project(&self, project_id: &str) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|t| t.project_id == project_id)
            .count()
    }
}
