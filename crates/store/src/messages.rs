//! MessageStore — messages ordered within their session.

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::session::StoredMessage;

use crate::persist;

pub struct MessageStore {
    inner: RwLock<Vec<StoredMessage>>,
    persist_path: PathBuf,
}

impl MessageStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("messages.json");
        let items: Vec<StoredMessage> = persist::load_items(&persist_path);
        Self {
            inner: RwLock::new(items),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items = self.inner.read().await.clone();
        persist::save_items(&self.persist_path, &items).await;
    }

    pub async fn append(&self, message: StoredMessage) -> StoredMessage {
        self.inner.write().await.push(message.clone());
        self.persist().await;
        message
    }

    /// Append several messages in one persistence pass, preserving order.
    pub async fn append_all(&self, messages: Vec<StoredMessage>) {
        if messages.is_empty() {
            return;
        }
        self.inner.write().await.extend(messages);
        self.persist().await;
    }

    /// Messages for a session in insertion order (stable under equal
    /// timestamps because the backing vec preserves append order).
    pub async fn list_by_session(&self, session_id: Uuid) -> Vec<StoredMessage> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn count_for_session(&self, session_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .iter()
            .filter(|m| m.session_id == session_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_domain::tool::{MessageContent, Role};

    fn msg(session_id: Uuid, role: Role, text: &str) -> StoredMessage {
        StoredMessage::new(session_id, role, MessageContent::Text(text.into()))
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path());
        let sid = Uuid::new_v4();

        store.append(msg(sid, Role::User, "first")).await;
        store.append(msg(sid, Role::Assistant, "second")).await;
        store.append(msg(Uuid::new_v4(), Role::User, "other session")).await;

        let list = store.list_by_session(sid).await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].content.extract_all_text(), "first");
        assert_eq!(list[1].content.extract_all_text(), "second");
    }

    #[tokio::test]
    async fn append_all_batches() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path());
        let sid = Uuid::new_v4();
        store
            .append_all(vec![
                msg(sid, Role::Assistant, "tool uses"),
                msg(sid, Role::User, "tool results"),
            ])
            .await;
        assert_eq!(store.count_for_session(sid).await, 2);
    }
}
