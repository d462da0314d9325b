//! Approval requests gating high-risk tool execution.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk classification for a tool. High and critical always gate on
/// approval; medium/low run freely unless a host override says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn requires_approval(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// Default time-to-live for a pending approval.
pub const DEFAULT_APPROVAL_TTL_SECONDS: i64 = 300;

/// A gated pause requiring an external decision before a high-risk tool
/// executes. Expiration is computed lazily on read — no background sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub project_id: String,
    pub session_id: Uuid,
    pub tool_call_id: String,
    pub tool_id: String,
    pub tool_input: serde_json::Value,
    pub risk_level: RiskLevel,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolution_note: Option<String>,
}

impl ApprovalRequest {
    pub fn new(
        project_id: impl Into<String>,
        session_id: Uuid,
        tool_call_id: impl Into<String>,
        tool_id: impl Into<String>,
        tool_input: serde_json::Value,
        risk_level: RiskLevel,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            session_id,
            tool_call_id: tool_call_id.into(),
            tool_id: tool_id.into(),
            tool_input,
            risk_level,
            status: ApprovalStatus::Pending,
            requested_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    /// Apply lazy expiration: a pending request past its deadline reads as
    /// expired without any background process having run.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ApprovalStatus {
        if self.status == ApprovalStatus::Pending && self.expires_at < now {
            ApprovalStatus::Expired
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ttl: i64) -> ApprovalRequest {
        ApprovalRequest::new(
            "P1",
            Uuid::new_v4(),
            "tc_1",
            "db-drop",
            serde_json::json!({"table": "users"}),
            RiskLevel::Critical,
            ttl,
        )
    }

    #[test]
    fn pending_within_ttl() {
        let r = request(300);
        assert_eq!(r.effective_status(Utc::now()), ApprovalStatus::Pending);
    }

    #[test]
    fn pending_past_deadline_reads_expired() {
        let r = request(300);
        let later = r.expires_at + Duration::seconds(1);
        assert_eq!(r.effective_status(later), ApprovalStatus::Expired);
    }

    #[test]
    fn resolved_status_is_not_expired() {
        let mut r = request(300);
        r.status = ApprovalStatus::Approved;
        let later = r.expires_at + Duration::seconds(1);
        assert_eq!(r.effective_status(later), ApprovalStatus::Approved);
    }

    #[test]
    fn risk_gating() {
        assert!(!RiskLevel::Low.requires_approval());
        assert!(!RiskLevel::Medium.requires_approval());
        assert!(RiskLevel::High.requires_approval());
        assert!(RiskLevel::Critical.requires_approval());
    }
}
