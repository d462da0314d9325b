//! Webhook registrations and inbound webhook events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Active,
    Paused,
}

/// A registered inbound webhook. `trigger_prompt` is a `{{dot.path}}`
/// template expanded against the inbound payload before it is handed to
/// the agent as the user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: Uuid,
    pub project_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub name: String,
    pub trigger_prompt: String,
    /// Env var holding the shared HMAC secret. None disables signature checks.
    #[serde(default)]
    pub secret_env_var: Option<String>,
    /// Source-IP allowlist. Empty means any source.
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    pub status: WebhookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One inbound delivery, as received by the trigger endpoint.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub webhook_id: Uuid,
    pub payload: serde_json::Value,
    /// Lower-cased header map.
    pub headers: std::collections::HashMap<String, String>,
    /// Raw request body, the exact bytes the HMAC is computed over.
    pub raw_body: String,
    pub source_ip: Option<String>,
    pub received_at: DateTime<Utc>,
}
