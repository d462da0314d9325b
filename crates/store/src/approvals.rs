//! ApprovalRepo — persistent approval requests.
//!
//! The approval gate reads through this repo; lazy expiration is applied
//! to every record leaving the store so a pending request past its
//! deadline is always observed as expired.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::approval::{ApprovalRequest, ApprovalStatus};
use nexus_domain::error::{Error, Result};

use crate::persist;

pub struct ApprovalRepo {
    inner: RwLock<HashMap<Uuid, ApprovalRequest>>,
    persist_path: PathBuf,
}

impl ApprovalRepo {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("approvals.json");
        let items: Vec<ApprovalRequest> = persist::load_items(&persist_path);
        let mut map = HashMap::new();
        for a in items {
            map.insert(a.id, a);
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items: Vec<ApprovalRequest> = self.inner.read().await.values().cloned().collect();
        persist::save_items(&self.persist_path, &items).await;
    }

    fn with_lazy_expiry(mut request: ApprovalRequest) -> ApprovalRequest {
        request.status = request.effective_status(Utc::now());
        request
    }

    pub async fn insert(&self, request: ApprovalRequest) -> ApprovalRequest {
        self.inner.write().await.insert(request.id, request.clone());
        self.persist().await;
        request
    }

    pub async fn get(&self, id: Uuid) -> Result<ApprovalRequest> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .map(Self::with_lazy_expiry)
            .ok_or_else(|| Error::NotFound(format!("approval {id}")))
    }

    /// Transition pending → approved|denied. Expired or already-resolved
    /// requests are rejected.
    pub async fn resolve(
        &self,
        id: Uuid,
        approve: bool,
        resolved_by: String,
        note: Option<String>,
    ) -> Result<ApprovalRequest> {
        let resolved = {
            let mut map = self.inner.write().await;
            let request = map
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("approval {id}")))?;

            match request.effective_status(Utc::now()) {
                ApprovalStatus::Pending => {}
                ApprovalStatus::Expired => {
                    request.status = ApprovalStatus::Expired;
                    return Err(Error::ApprovalExpired(id.to_string()));
                }
                other => {
                    return Err(Error::Validation(format!(
                        "approval {id} already resolved ({other:?})"
                    )));
                }
            }

            request.status = if approve {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Denied
            };
            request.resolved_at = Some(Utc::now());
            request.resolved_by = Some(resolved_by);
            request.resolution_note = note;
            request.clone()
        };
        self.persist().await;
        Ok(resolved)
    }

    pub async fn list_pending(&self, project_id: &str) -> Vec<ApprovalRequest> {
        let now = Utc::now();
        let mut items: Vec<ApprovalRequest> = self
            .inner
            .read()
            .await
            .values()
            .filter(|a| a.project_id == project_id)
            .filter(|a| a.effective_status(now) == ApprovalStatus::Pending)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        items
    }
}
