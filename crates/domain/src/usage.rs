//! Per-LLM-call cost ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One LLM call's worth of tokens and cost, attributed to a project,
/// session, and trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub project_id: String,
    pub session_id: Uuid,
    pub trace_id: Uuid,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_tokens: u32,
    #[serde(default)]
    pub cache_write_tokens: u32,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }
}
