//! Channel adapters and the resolver that routes replies back out.
//!
//! An adapter binds one `(project, channel)` pair to a delivery
//! mechanism. Multiple adapter kinds may serve the same channel name
//! across projects; resolution is cached with a TTL and invalidated on
//! integration mutations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nexus_domain::error::{Error, Result};

/// A reply headed back out on a channel.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub project_id: String,
    pub channel: String,
    pub recipient_identifier: String,
    pub text: String,
    pub reply_to_channel_message_id: Option<String>,
}

/// One inbound channel delivery, normalized.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: Uuid,
    pub project_id: String,
    pub channel: String,
    pub channel_message_id: String,
    pub sender_identifier: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub media_urls: Vec<String>,
    pub reply_to_channel_message_id: Option<String>,
    pub raw_payload: serde_json::Value,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

/// Contract every channel adapter implements.
#[async_trait::async_trait]
pub trait ChannelAdapter: Send + Sync + std::fmt::Debug {
    fn channel(&self) -> &str;

    /// Deliver an outbound reply.
    async fn send(&self, out: OutboundMessage) -> Result<()>;

    /// Normalize a raw channel payload into an [`InboundMessage`].
    fn parse_inbound(&self, project_id: &str, payload: &serde_json::Value)
        -> Result<InboundMessage>;

    async fn is_healthy(&self) -> bool;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Integration config & builtin adapter kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A channel integration registered for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    pub id: Uuid,
    pub project_id: String,
    pub channel: String,
    /// Adapter kind: "log" (development sink) or "http_push" (POST the
    /// reply to a delivery URL).
    pub kind: String,
    #[serde(default)]
    pub delivery_url: Option<String>,
}

/// Development sink: replies are logged, inbound payloads use the
/// generic shape `{messageId, sender, senderName?, text, replyTo?}`.
#[derive(Debug)]
pub struct LoggingAdapter {
    channel: String,
}

impl LoggingAdapter {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
        }
    }
}

fn parse_generic_inbound(
    channel: &str,
    project_id: &str,
    payload: &serde_json::Value,
) -> Result<InboundMessage> {
    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Validation("inbound payload missing 'text'".into()))?;
    let sender = payload
        .get("sender")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Validation("inbound payload missing 'sender'".into()))?;

    Ok(InboundMessage {
        id: Uuid::new_v4(),
        project_id: project_id.to_string(),
        channel: channel.to_string(),
        channel_message_id: payload
            .get("messageId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        sender_identifier: sender.to_string(),
        sender_name: payload
            .get("senderName")
            .and_then(|v| v.as_str())
            .map(String::from),
        content: text.to_string(),
        media_urls: payload
            .get("mediaUrls")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|u| u.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
        reply_to_channel_message_id: payload
            .get("replyTo")
            .and_then(|v| v.as_str())
            .map(String::from),
        raw_payload: payload.clone(),
        received_at: chrono::Utc::now(),
    })
}

#[async_trait::async_trait]
impl ChannelAdapter for LoggingAdapter {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn send(&self, out: OutboundMessage) -> Result<()> {
        tracing::info!(
            project_id = %out.project_id,
            channel = %out.channel,
            recipient = %out.recipient_identifier,
            chars = out.text.len(),
            "outbound reply (log adapter)"
        );
        Ok(())
    }

    fn parse_inbound(
        &self,
        project_id: &str,
        payload: &serde_json::Value,
    ) -> Result<InboundMessage> {
        parse_generic_inbound(&self.channel, project_id, payload)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Pushes replies to a configured delivery URL via HTTP POST.
#[derive(Debug)]
pub struct HttpPushAdapter {
    channel: String,
    delivery_url: String,
    client: reqwest::Client,
}

impl HttpPushAdapter {
    pub fn new(channel: &str, delivery_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            channel: channel.to_string(),
            delivery_url: delivery_url.to_string(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for HttpPushAdapter {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn send(&self, out: OutboundMessage) -> Result<()> {
        let body = serde_json::json!({
            "recipient": out.recipient_identifier,
            "text": out.text,
            "replyTo": out.reply_to_channel_message_id,
        });
        let response = self
            .client
            .post(&self.delivery_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("channel delivery: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "channel delivery returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn parse_inbound(
        &self,
        project_id: &str,
        payload: &serde_json::Value,
    ) -> Result<InboundMessage> {
        parse_generic_inbound(&self.channel, project_id, payload)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChannelResolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const RESOLVER_CACHE_TTL: Duration = Duration::from_secs(60);

struct CachedAdapter {
    adapter: Arc<dyn ChannelAdapter>,
    cached_at: Instant,
}

/// Registry of channel integrations, keyed `(project, channel)`, with a
/// TTL-cached adapter per key. Mutations invalidate the cache entry.
pub struct ChannelResolver {
    integrations: RwLock<HashMap<(String, String), IntegrationConfig>>,
    cache: RwLock<HashMap<(String, String), CachedAdapter>>,
}

impl ChannelResolver {
    pub fn new() -> Self {
        Self {
            integrations: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, config: IntegrationConfig) {
        let key = (config.project_id.clone(), config.channel.clone());
        self.integrations.write().insert(key.clone(), config);
        self.invalidate(&key.0, &key.1);
    }

    pub fn remove(&self, project_id: &str, channel: &str) -> bool {
        let key = (project_id.to_string(), channel.to_string());
        let removed = self.integrations.write().remove(&key).is_some();
        self.invalidate(project_id, channel);
        removed
    }

    pub fn invalidate(&self, project_id: &str, channel: &str) {
        self.cache
            .write()
            .remove(&(project_id.to_string(), channel.to_string()));
    }

    pub fn list(&self, project_id: &str) -> Vec<IntegrationConfig> {
        let mut items: Vec<IntegrationConfig> = self
            .integrations
            .read()
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.channel.cmp(&b.channel));
        items
    }

    /// Resolve the adapter for `(project, channel)`, consulting the TTL
    /// cache first.
    pub fn resolve(&self, project_id: &str, channel: &str) -> Result<Arc<dyn ChannelAdapter>> {
        let key = (project_id.to_string(), channel.to_string());

        if let Some(cached) = self.cache.read().get(&key) {
            if cached.cached_at.elapsed() < RESOLVER_CACHE_TTL {
                return Ok(cached.adapter.clone());
            }
        }

        let config = self
            .integrations
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no channel integration for project '{project_id}' channel '{channel}'"
                ))
            })?;

        let adapter: Arc<dyn ChannelAdapter> = match config.kind.as_str() {
            "http_push" => {
                let url = config.delivery_url.as_deref().ok_or_else(|| {
                    Error::Validation("http_push integration requires deliveryUrl".into())
                })?;
                Arc::new(HttpPushAdapter::new(channel, url))
            }
            _ => Arc::new(LoggingAdapter::new(channel)),
        };

        self.cache.write().insert(
            key,
            CachedAdapter {
                adapter: adapter.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(adapter)
    }
}

impl Default for ChannelResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration(project: &str, channel: &str, kind: &str) -> IntegrationConfig {
        IntegrationConfig {
            id: Uuid::new_v4(),
            project_id: project.into(),
            channel: channel.into(),
            kind: kind.into(),
            delivery_url: (kind == "http_push").then(|| "http://localhost:1/deliver".into()),
        }
    }

    #[test]
    fn resolve_unknown_is_not_found() {
        let resolver = ChannelResolver::new();
        let err = resolver.resolve("P1", "whatsapp").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn resolve_caches_and_invalidates() {
        let resolver = ChannelResolver::new();
        resolver.upsert(integration("P1", "whatsapp", "log"));

        let a = resolver.resolve("P1", "whatsapp").unwrap();
        assert_eq!(a.channel(), "whatsapp");
        assert_eq!(resolver.cache.read().len(), 1);

        resolver.remove("P1", "whatsapp");
        assert!(resolver.resolve("P1", "whatsapp").is_err());
    }

    #[test]
    fn generic_inbound_parsing() {
        let adapter = LoggingAdapter::new("chat");
        let payload = serde_json::json!({
            "messageId": "m1",
            "sender": "+15550001",
            "senderName": "Ada",
            "text": "hello",
            "replyTo": "m0",
        });
        let inbound = adapter.parse_inbound("P1", &payload).unwrap();
        assert_eq!(inbound.sender_identifier, "+15550001");
        assert_eq!(inbound.content, "hello");
        assert_eq!(inbound.reply_to_channel_message_id.as_deref(), Some("m0"));

        let err = adapter
            .parse_inbound("P1", &serde_json::json!({"sender": "x"}))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn list_is_project_scoped() {
        let resolver = ChannelResolver::new();
        resolver.upsert(integration("P1", "whatsapp", "log"));
        resolver.upsert(integration("P1", "telegram", "log"));
        resolver.upsert(integration("P2", "whatsapp", "log"));
        assert_eq!(resolver.list("P1").len(), 2);
    }
}
