//! Approval gate — gates high-risk tools behind an external decision.
//!
//! Requests persist through the approval repo (lazy TTL expiry); waiters
//! block on a per-request `Notify` with a polling backoff so a missed
//! wakeup can never hang a turn. Resolution events also fan out on a
//! broadcast channel for dashboards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use nexus_domain::approval::{ApprovalRequest, ApprovalStatus, RiskLevel};
use nexus_domain::cancel::CancelToken;
use nexus_domain::error::Result;
use nexus_store::ApprovalRepo;

/// Poll cadence while waiting: start at 500ms, double up to 5s.
const WAIT_POLL_INITIAL: Duration = Duration::from_millis(500);
const WAIT_POLL_MAX: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ApprovalEvent {
    pub request: ApprovalRequest,
}

pub struct ApprovalGate {
    repo: Arc<ApprovalRepo>,
    ttl_seconds: i64,
    waiters: Mutex<HashMap<Uuid, Arc<Notify>>>,
    event_tx: broadcast::Sender<ApprovalEvent>,
}

impl ApprovalGate {
    pub fn new(repo: Arc<ApprovalRepo>, ttl_seconds: i64) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            repo,
            ttl_seconds,
            waiters: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.event_tx.subscribe()
    }

    /// Open a pending approval with `expires_at = now + TTL`.
    pub async fn request_approval(
        &self,
        project_id: &str,
        session_id: Uuid,
        tool_call_id: &str,
        tool_id: &str,
        tool_input: serde_json::Value,
        risk_level: RiskLevel,
    ) -> ApprovalRequest {
        let request = ApprovalRequest::new(
            project_id,
            session_id,
            tool_call_id,
            tool_id,
            tool_input,
            risk_level,
            self.ttl_seconds,
        );
        let request = self.repo.insert(request).await;
        tracing::info!(
            approval_id = %request.id,
            project_id,
            tool_id,
            risk = ?risk_level,
            "approval requested"
        );
        let _ = self.event_tx.send(ApprovalEvent {
            request: request.clone(),
        });
        request
    }

    /// Move pending → approved|denied and wake any waiter.
    pub async fn resolve(
        &self,
        id: Uuid,
        approve: bool,
        resolved_by: String,
        note: Option<String>,
    ) -> Result<ApprovalRequest> {
        let resolved = self.repo.resolve(id, approve, resolved_by, note).await?;
        if let Some(notify) = self.waiters.lock().get(&id) {
            notify.notify_waiters();
        }
        let _ = self.event_tx.send(ApprovalEvent {
            request: resolved.clone(),
        });
        Ok(resolved)
    }

    /// True only for an approved, unexpired request.
    pub async fn is_approved(&self, id: Uuid) -> bool {
        self.repo
            .get(id)
            .await
            .map(|r| r.status == ApprovalStatus::Approved)
            .unwrap_or(false)
    }

    pub async fn get(&self, id: Uuid) -> Result<ApprovalRequest> {
        self.repo.get(id).await
    }

    pub async fn list_pending(&self, project_id: &str) -> Vec<ApprovalRequest> {
        self.repo.list_pending(project_id).await
    }

    /// Suspend until the request leaves pending. Returns the terminal
    /// status (approved, denied, or expired); cancellation returns the
    /// current status immediately.
    pub async fn wait_resolution(&self, id: Uuid, cancel: &CancelToken) -> ApprovalStatus {
        let notify = {
            let mut waiters = self.waiters.lock();
            waiters.entry(id).or_insert_with(|| Arc::new(Notify::new())).clone()
        };

        let mut poll = WAIT_POLL_INITIAL;
        let status = loop {
            let status = self
                .repo
                .get(id)
                .await
                .map(|r| r.status)
                .unwrap_or(ApprovalStatus::Expired);
            if status != ApprovalStatus::Pending || cancel.is_cancelled() {
                break status;
            }

            // Wake on resolution or after the poll interval, whichever
            // comes first; the loop re-reads the store either way.
            let _ = tokio::time::timeout(poll, notify.notified()).await;
            poll = (poll * 2).min(WAIT_POLL_MAX);
        };

        self.waiters.lock().remove(&id);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(ttl: i64) -> (tempfile::TempDir, Arc<ApprovalGate>) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(ApprovalRepo::new(dir.path()));
        (dir, Arc::new(ApprovalGate::new(repo, ttl)))
    }

    async fn pending(gate: &ApprovalGate) -> ApprovalRequest {
        gate.request_approval(
            "P1",
            Uuid::new_v4(),
            "tc_1",
            "db-drop",
            serde_json::json!({"table": "users"}),
            RiskLevel::Critical,
        )
        .await
    }

    #[tokio::test]
    async fn approve_wakes_waiter() {
        let (_dir, gate) = gate(300);
        let request = pending(&gate).await;
        assert!(!gate.is_approved(request.id).await);

        let waiter_gate = gate.clone();
        let id = request.id;
        let waiter = tokio::spawn(async move {
            waiter_gate.wait_resolution(id, &CancelToken::new()).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.resolve(id, true, "admin".into(), None).await.unwrap();

        let status = waiter.await.unwrap();
        assert_eq!(status, ApprovalStatus::Approved);
        assert!(gate.is_approved(id).await);
    }

    #[tokio::test]
    async fn denial_is_terminal() {
        let (_dir, gate) = gate(300);
        let request = pending(&gate).await;
        gate.resolve(request.id, false, "admin".into(), Some("too risky".into()))
            .await
            .unwrap();

        let status = gate
            .wait_resolution(request.id, &CancelToken::new())
            .await;
        assert_eq!(status, ApprovalStatus::Denied);
        assert!(!gate.is_approved(request.id).await);
    }

    #[tokio::test]
    async fn expired_request_is_never_approved() {
        let (_dir, gate) = gate(-1);
        let request = pending(&gate).await;
        // No background sweep has run; reads still observe expiry.
        assert!(!gate.is_approved(request.id).await);
        assert_eq!(
            gate.get(request.id).await.unwrap().status,
            ApprovalStatus::Expired
        );
        let status = gate
            .wait_resolution(request.id, &CancelToken::new())
            .await;
        assert_eq!(status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let (_dir, gate) = gate(300);
        let request = pending(&gate).await;

        let cancel = CancelToken::new();
        cancel.cancel();
        let status = gate.wait_resolution(request.id, &cancel).await;
        assert_eq!(status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn events_broadcast_on_request_and_resolve() {
        let (_dir, gate) = gate(300);
        let mut rx = gate.subscribe();
        let request = pending(&gate).await;
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.request.id, request.id);
        assert_eq!(ev.request.status, ApprovalStatus::Pending);

        gate.resolve(request.id, true, "admin".into(), None).await.unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.request.status, ApprovalStatus::Approved);
    }
}
