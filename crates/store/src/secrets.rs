//! SecretStore — encrypted secret rows, unique per (project, key).
//!
//! Rows hold only ciphertext; encryption and decryption live in the
//! gateway's secret service. Plaintext never reaches this store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::error::{Error, Result};

use crate::persist;

/// Persisted envelope: hex ciphertext, hex(24) IV, hex(32) auth tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRow {
    pub id: Uuid,
    pub project_id: String,
    pub key: String,
    pub encrypted_value: String,
    pub iv: String,
    pub auth_tag: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata view, safe to return from list endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    pub id: Uuid,
    pub project_id: String,
    pub key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SecretRow> for SecretMetadata {
    fn from(row: &SecretRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id.clone(),
            key: row.key.clone(),
            description: row.description.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct SecretStore {
    inner: RwLock<Vec<SecretRow>>,
    persist_path: PathBuf,
}

impl SecretStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("secrets.json");
        let items: Vec<SecretRow> = persist::load_items(&persist_path);
        Self {
            inner: RwLock::new(items),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items = self.inner.read().await.clone();
        persist::save_items(&self.persist_path, &items).await;
    }

    /// Insert or replace the row for `(project, key)`.
    pub async fn upsert(&self, row: SecretRow) -> SecretMetadata {
        let metadata = {
            let mut rows = self.inner.write().await;
            if let Some(existing) = rows
                .iter_mut()
                .find(|r| r.project_id == row.project_id && r.key == row.key)
            {
                existing.encrypted_value = row.encrypted_value;
                existing.iv = row.iv;
                existing.auth_tag = row.auth_tag;
                existing.description = row.description;
                existing.updated_at = Utc::now();
                SecretMetadata::from(&*existing)
            } else {
                let metadata = SecretMetadata::from(&row);
                rows.push(row);
                metadata
            }
        };
        self.persist().await;
        metadata
    }

    pub async fn get(&self, project_id: &str, key: &str) -> Result<SecretRow> {
        self.inner
            .read()
            .await
            .iter()
            .find(|r| r.project_id == project_id && r.key == key)
            .cloned()
            .ok_or_else(|| Error::SecretNotFound(format!("{project_id}/{key}")))
    }

    pub async fn exists(&self, project_id: &str, key: &str) -> bool {
        self.inner
            .read()
            .await
            .iter()
            .any(|r| r.project_id == project_id && r.key == key)
    }

    pub async fn delete(&self, project_id: &str, key: &str) -> Result<()> {
        let removed = {
            let mut rows = self.inner.write().await;
            let before = rows.len();
            rows.retain(|r| !(r.project_id == project_id && r.key == key));
            rows.len() != before
        };
        if !removed {
            return Err(Error::SecretNotFound(format!("{project_id}/{key}")));
        }
        self.persist().await;
        Ok(())
    }

    /// Metadata only — ciphertext never leaves through list.
    pub async fn list(&self, project_id: &str) -> Vec<SecretMetadata> {
        let mut items: Vec<SecretMetadata> = self
            .inner
            .read()
            .await
            .iter()
            .filter(|r| r.project_id == project_id)
            .map(SecretMetadata::from)
            .collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }
}
