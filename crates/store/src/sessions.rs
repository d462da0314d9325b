//! SessionStore — conversation threads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::error::{Error, Result};
use nexus_domain::session::{Session, SessionStatus};

use crate::persist;

pub struct SessionStore {
    inner: RwLock<HashMap<Uuid, Session>>,
    persist_path: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("sessions.json");
        let items: Vec<Session> = persist::load_items(&persist_path);
        let mut map = HashMap::new();
        for s in items {
            map.insert(s.id, s);
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items: Vec<Session> = self.inner.read().await.values().cloned().collect();
        persist::save_items(&self.persist_path, &items).await;
    }

    pub async fn insert(&self, session: Session) -> Session {
        self.inner.write().await.insert(session.id, session.clone());
        self.persist().await;
        session
    }

    pub async fn get(&self, id: Uuid) -> Result<Session> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    pub async fn update(&self, id: Uuid, f: impl FnOnce(&mut Session)) -> Result<Session> {
        let updated = {
            let mut map = self.inner.write().await;
            let session = map
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
            f(session);
            session.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    /// Bump `last_active_at`, fire-and-forget style.
    pub async fn touch(&self, id: Uuid) {
        let _ = self.update(id, |s| s.last_active_at = Utc::now()).await;
    }

    pub async fn list_by_project(&self, project_id: &str) -> Vec<Session> {
        let mut items: Vec<Session> = self
            .inner
            .read()
            .await
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        items
    }

    /// Most recent open session whose metadata `contactId` matches; used
    /// by the inbound processor for channel fan-in.
    pub async fn find_active_for_contact(
        &self,
        project_id: &str,
        contact_id: Uuid,
    ) -> Option<Session> {
        let contact = contact_id.to_string();
        let now = Utc::now();
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.project_id == project_id && s.status == SessionStatus::Active)
            .filter(|s| s.expires_at.map_or(true, |exp| exp > now))
            .filter(|s| s.metadata.get("contactId").and_then(|v| v.as_str()) == Some(&contact))
            .max_by_key(|s| s.last_active_at)
            .cloned()
    }

    /// True when a project has any session at all (projects with sessions
    /// cannot be deleted).
    pub async fn project_has_sessions(&self, project_id: &str) -> bool {
        self.inner
            .read()
            .await
            .values()
            .any(|s| s.project_id == project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_active_for_contact_prefers_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let contact = Uuid::new_v4();

        let mut older = Session::new(
            "P1",
            serde_json::json!({"contactId": contact.to_string(), "channel": "whatsapp"}),
        );
        older.last_active_at = Utc::now() - chrono::Duration::hours(2);
        let older = store.insert(older).await;

        let newer = store
            .insert(Session::new(
                "P1",
                serde_json::json!({"contactId": contact.to_string(), "channel": "whatsapp"}),
            ))
            .await;

        let found = store.find_active_for_contact("P1", contact).await.unwrap();
        assert_eq!(found.id, newer.id);

        // Closing the newer one falls back to the older.
        store
            .update(newer.id, |s| s.status = SessionStatus::Closed)
            .await
            .unwrap();
        let found = store.find_active_for_contact("P1", contact).await.unwrap();
        assert_eq!(found.id, older.id);
    }

    #[tokio::test]
    async fn contact_sessions_are_project_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let contact = Uuid::new_v4();
        store
            .insert(Session::new(
                "P2",
                serde_json::json!({"contactId": contact.to_string()}),
            ))
            .await;
        assert!(store.find_active_for_contact("P1", contact).await.is_none());
    }

    #[tokio::test]
    async fn project_has_sessions_gate() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(!store.project_has_sessions("P1").await);
        store.insert(Session::new("P1", serde_json::Value::Null)).await;
        assert!(store.project_has_sessions("P1").await);
    }
}
