use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// Token usage reported at the end of a provider stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u32>,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Events emitted during LLM streaming (provider-agnostic).
///
/// A successful stream carries exactly one `message_start` and exactly one
/// `message_end`; tool-use events are bracketed by `tool_use_start` /
/// `tool_use_end` with input JSON fragments delivered via `tool_use_delta`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// A new assistant message has started.
    #[serde(rename = "message_start")]
    MessageStart { message_id: String },

    /// Incremental assistant text.
    #[serde(rename = "content_delta")]
    ContentDelta { text: String },

    /// The model is beginning a tool invocation.
    #[serde(rename = "tool_use_start")]
    ToolUseStart { id: String, name: String },

    /// A fragment of the tool input JSON.
    #[serde(rename = "tool_use_delta")]
    ToolUseDelta { id: String, partial_input: String },

    /// The tool invocation is complete with parsed input.
    #[serde(rename = "tool_use_end")]
    ToolUseEnd {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The assistant message is finished.
    #[serde(rename = "message_end")]
    MessageEnd {
        stop_reason: StopReason,
        usage: TokenUsage,
    },

    /// A terminal streaming error.
    #[serde(rename = "error")]
    Error { cause: String },
}
