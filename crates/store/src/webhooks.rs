//! WebhookStore — registered inbound webhooks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::error::{Error, Result};
use nexus_domain::webhook::Webhook;

use crate::persist;

pub struct WebhookStore {
    inner: RwLock<HashMap<Uuid, Webhook>>,
    persist_path: PathBuf,
}

impl WebhookStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("webhooks.json");
        let items: Vec<Webhook> = persist::load_items(&persist_path);
        let mut map = HashMap::new();
        for w in items {
            map.insert(w.id, w);
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items: Vec<Webhook> = self.inner.read().await.values().cloned().collect();
        persist::save_items(&self.persist_path, &items).await;
    }

    pub async fn insert(&self, webhook: Webhook) -> Webhook {
        self.inner.write().await.insert(webhook.id, webhook.clone());
        self.persist().await;
        webhook
    }

    pub async fn get(&self, id: Uuid) -> Result<Webhook> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("webhook {id}")))
    }

    pub async fn update(&self, id: Uuid, f: impl FnOnce(&mut Webhook)) -> Result<Webhook> {
        let updated = {
            let mut map = self.inner.write().await;
            let webhook = map
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("webhook {id}")))?;
            f(webhook);
            webhook.updated_at = Utc::now();
            webhook.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        let removed = self.inner.write().await.remove(&id).is_some();
        if removed {
            self.persist().await;
        }
        removed
    }

    pub async fn list_by_project(&self, project_id: &str) -> Vec<Webhook> {
        let mut items: Vec<Webhook> = self
            .inner
            .read()
            .await
            .values()
            .filter(|w| w.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }
}
