//! Long-term memory entries and compaction accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimensionality of stored embeddings.
pub const EMBEDDING_DIM: usize = 1536;

/// An episodic long-term memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: Uuid,
    pub project_id: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub category: String,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Relative importance in [0, 1].
    pub importance: f32,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Record of a summary replacing a span of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionEntry {
    pub session_id: Uuid,
    pub summary: String,
    pub messages_compacted: usize,
    pub tokens_recovered: u64,
    pub created_at: DateTime<Utc>,
}
