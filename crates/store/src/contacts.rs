//! ContactStore — external identities per project.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::contact::Contact;
use nexus_domain::error::{Error, Result};

use crate::persist;

pub struct ContactStore {
    inner: RwLock<HashMap<Uuid, Contact>>,
    persist_path: PathBuf,
}

impl ContactStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("contacts.json");
        let items: Vec<Contact> = persist::load_items(&persist_path);
        let mut map = HashMap::new();
        for c in items {
            map.insert(c.id, c);
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items: Vec<Contact> = self.inner.read().await.values().cloned().collect();
        persist::save_items(&self.persist_path, &items).await;
    }

    pub async fn insert(&self, contact: Contact) -> Contact {
        self.inner.write().await.insert(contact.id, contact.clone());
        self.persist().await;
        contact
    }

    pub async fn get(&self, id: Uuid) -> Result<Contact> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("contact {id}")))
    }

    /// Look up by `(project, channel identifier)` — phone, email, or
    /// external id, whichever matches.
    pub async fn find_by_identifier(&self, project_id: &str, identifier: &str) -> Option<Contact> {
        self.inner
            .read()
            .await
            .values()
            .find(|c| c.project_id == project_id && c.matches_identifier(identifier))
            .cloned()
    }

    pub async fn update(&self, id: Uuid, f: impl FnOnce(&mut Contact)) -> Result<Contact> {
        let updated = {
            let mut map = self.inner.write().await;
            let contact = map
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("contact {id}")))?;
            f(contact);
            contact.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    pub async fn list_by_project(&self, project_id: &str) -> Vec<Contact> {
        let mut items: Vec<Contact> = self
            .inner
            .read()
            .await
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }
}
