//! Sessions and the messages ordered within them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stream::TokenUsage;
use crate::tool::{MessageContent, Role, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Closed,
    Expired,
}

/// A conversation thread. Metadata is opaque to the runtime; channel
/// routing stashes `contactId`, `channel`, and `agentId` in it, the
/// scheduler stashes `source` and `taskId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub project_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(project_id: impl Into<String>, metadata: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            status: SessionStatus::Active,
            metadata,
            created_at: now,
            last_active_at: now,
            expires_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// A persisted message, ordered within its session by (created_at, seq).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(session_id: Uuid, role: Role, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role,
            content,
            tool_calls: None,
            usage: None,
            trace_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_trace(mut self, trace_id: Uuid) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}
