use uuid::Uuid;

use nexus_domain::error::Result;
use nexus_domain::stream::{BoxStream, ChatEvent};
use nexus_domain::tool::{Message, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic streaming chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatParams {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// System prompt, sent the way the vendor expects it.
    pub system_prompt: Option<String>,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    pub stop_sequences: Vec<String>,
    /// Propagated into request headers/logs for correlation.
    pub trace_id: Uuid,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core adapter trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every LLM adapter must implement.
///
/// Implementations translate between our internal types and each vendor's
/// HTTP wire format. A successful stream emits exactly one
/// `message_start` and exactly one `message_end`; tool-use events are
/// bracketed by `tool_use_start` / `tool_use_end` with the input JSON
/// assembled from `tool_use_delta` fragments.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// Open a streaming chat completion.
    async fn chat(&self, params: &ChatParams) -> Result<BoxStream<'static, Result<ChatEvent>>>;

    /// Estimate the token count of a message list. Used for context-window
    /// fitting and budget prechecks; authoritative counts arrive in
    /// `message_end.usage`.
    fn count_tokens(&self, messages: &[Message]) -> u32;

    /// The model's context window, in tokens.
    fn context_window(&self) -> u32;

    /// Whether this provider/model combination supports tool use.
    fn supports_tool_use(&self) -> bool;

    /// A unique identifier for this provider instance (e.g. "anthropic").
    fn provider_id(&self) -> &str;

    /// The model this adapter targets.
    fn model(&self) -> &str;
}
