//! Execution trace — the ordered event log and aggregates for one turn.
//!
//! Built incrementally in memory while a turn runs, then persisted
//! atomically on finalize. Append-only after persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stream::TokenUsage;

/// The exact versions of the three active prompt layers captured at turn
/// start, recorded into the trace for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSnapshot {
    pub identity_version: u32,
    pub instructions_version: u32,
    pub safety_version: u32,
    pub composed_system_prompt: String,
    pub assembled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Running,
    Completed,
    Failed,
    MaxTurns,
}

/// One entry in the trace event log.
///
/// `seq` is a monotonic per-trace sequence number (insertion order is the
/// tiebreaker for equal timestamps).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEventKind {
    LlmRequest,
    LlmResponse {
        text: String,
        usage: TokenUsage,
    },
    ToolCall {
        tool_call_id: String,
        tool_id: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        output: String,
        is_error: bool,
    },
    ApprovalWait {
        approval_id: Uuid,
    },
    Error {
        message: String,
    },
}

/// Immutable audit of one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrace {
    pub id: Uuid,
    pub project_id: String,
    pub session_id: Uuid,
    pub prompt_snapshot: PromptSnapshot,
    pub events: Vec<TraceEvent>,
    pub total_duration_ms: u64,
    pub total_tokens_used: u64,
    pub total_cost_usd: f64,
    pub turn_count: u32,
    pub status: TraceStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionTrace {
    /// Tool calls recorded in this trace, in emission order.
    pub fn tool_calls(&self) -> Vec<(&str, &str)> {
        self.events
            .iter()
            .filter_map(|e| match &e.kind {
                TraceEventKind::ToolCall {
                    tool_call_id,
                    tool_id,
                    ..
                } => Some((tool_call_id.as_str(), tool_id.as_str())),
                _ => None,
            })
            .collect()
    }
}
