//! PromptLayerStore — immutable versioned prompt fragments.
//!
//! Enforces the two schema invariants: `(project, layer_type, version)` is
//! unique with versions allocated as the next integer per (project, type),
//! and at most one layer per (project, type) is active. Activation runs
//! deactivate-all-then-activate-target under one write lock so no reader
//! ever observes two active layers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::error::{Error, Result};
use nexus_domain::layer::{LayerType, PromptLayer};

use crate::persist;

pub struct PromptLayerStore {
    inner: RwLock<Vec<PromptLayer>>,
    persist_path: PathBuf,
}

impl PromptLayerStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("prompt_layers.json");
        let items: Vec<PromptLayer> = persist::load_items(&persist_path);
        if !items.is_empty() {
            tracing::info!(count = items.len(), "loaded prompt layers from disk");
        }
        Self {
            inner: RwLock::new(items),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items = self.inner.read().await.clone();
        persist::save_items(&self.persist_path, &items).await;
    }

    /// Create a new immutable version. The version number is the smallest
    /// positive integer not yet taken for (project, layer_type).
    pub async fn create(
        &self,
        project_id: &str,
        layer_type: LayerType,
        content: String,
        created_by: String,
        change_reason: String,
        activate: bool,
    ) -> Result<PromptLayer> {
        if content.trim().is_empty() {
            return Err(Error::Validation("layer content must not be empty".into()));
        }
        if created_by.trim().is_empty() || change_reason.trim().is_empty() {
            return Err(Error::Validation(
                "createdBy and changeReason are required".into(),
            ));
        }

        let layer = {
            let mut layers = self.inner.write().await;
            let version = layers
                .iter()
                .filter(|l| l.project_id == project_id && l.layer_type == layer_type)
                .map(|l| l.version)
                .max()
                .unwrap_or(0)
                + 1;

            if activate {
                for l in layers.iter_mut() {
                    if l.project_id == project_id && l.layer_type == layer_type {
                        l.is_active = false;
                    }
                }
            }

            let layer = PromptLayer {
                id: Uuid::new_v4(),
                project_id: project_id.to_string(),
                layer_type,
                version,
                content,
                is_active: activate,
                created_by,
                change_reason,
                created_at: Utc::now(),
            };
            layers.push(layer.clone());
            layer
        };
        self.persist().await;
        Ok(layer)
    }

    /// Activate a layer by id: deactivate every sibling of the same
    /// (project, type), then activate the target, atomically under the
    /// write lock. Rollback is activating an older version.
    pub async fn activate(&self, id: Uuid) -> Result<PromptLayer> {
        let activated = {
            let mut layers = self.inner.write().await;
            let target = layers
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("prompt layer {id}")))?;

            for l in layers.iter_mut() {
                if l.project_id == target.project_id && l.layer_type == target.layer_type {
                    l.is_active = l.id == id;
                }
            }
            layers.iter().find(|l| l.id == id).cloned().unwrap()
        };
        self.persist().await;
        Ok(activated)
    }

    pub async fn get(&self, id: Uuid) -> Result<PromptLayer> {
        self.inner
            .read()
            .await
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("prompt layer {id}")))
    }

    /// All versions for a project, newest version first, optionally
    /// filtered by type.
    pub async fn list(&self, project_id: &str, layer_type: Option<LayerType>) -> Vec<PromptLayer> {
        let mut items: Vec<PromptLayer> = self
            .inner
            .read()
            .await
            .iter()
            .filter(|l| l.project_id == project_id)
            .filter(|l| layer_type.map_or(true, |t| l.layer_type == t))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            (a.layer_type.as_str(), std::cmp::Reverse(a.version))
                .cmp(&(b.layer_type.as_str(), std::cmp::Reverse(b.version)))
        });
        items
    }

    /// The active layer per type for a project.
    pub async fn active_layers(&self, project_id: &str) -> HashMap<LayerType, PromptLayer> {
        let mut out = HashMap::new();
        for l in self.inner.read().await.iter() {
            if l.project_id == project_id && l.is_active {
                out.insert(l.layer_type, l.clone());
            }
        }
        out
    }

    /// Count of active layers for (project, type). Exists for invariant
    /// assertions in tests and health checks; always 0 or 1.
    pub async fn active_count(&self, project_id: &str, layer_type: LayerType) -> usize {
        self.inner
            .read()
            .await
            .iter()
            .filter(|l| l.project_id == project_id && l.layer_type == layer_type && l.is_active)
            .count()
    }
}
