//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API including tool use and streaming.
//! Anthropic puts system prompts in a separate top-level `system` field and
//! delivers tool input as `input_json_delta` fragments that we assemble and
//! parse when the content block closes.

use std::collections::HashMap;

use serde_json::Value;

use nexus_domain::error::Result;
use nexus_domain::project::ProviderSpec;
use nexus_domain::stream::{BoxStream, ChatEvent, StopReason, TokenUsage};
use nexus_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};

use crate::sse::{parse_tool_input, sse_event_stream};
use crate::traits::{ChatParams, ProviderAdapter};
use crate::util::{estimate_tokens, from_reqwest, resolve_api_key, status_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const PROVIDER_ID: &str = "anthropic";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM adapter for the Anthropic Messages API.
pub struct AnthropicAdapter {
    base_url: String,
    api_key: String,
    model: String,
    context_window: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("context_window", &self.context_window)
            .finish()
    }
}

impl AnthropicAdapter {
    /// Create a new adapter from a project's provider spec. The API key is
    /// resolved from the environment variable the spec names.
    pub fn from_spec(spec: &ProviderSpec, client: reqwest::Client) -> Result<Self> {
        let api_key = resolve_api_key(&spec.api_key_env_var)?;
        Ok(Self {
            base_url: spec
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: spec.model.clone(),
            context_window: 200_000,
            client,
        })
    }

    fn build_body(&self, params: &ChatParams) -> Value {
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in &params.messages {
            match msg.role {
                // System messages travel in the top-level field; any inline
                // ones are folded into it by the caller's prompt assembly.
                Role::System => {}
                Role::User => api_messages.push(user_msg_to_anthropic(msg)),
                Role::Assistant => api_messages.push(assistant_msg_to_anthropic(msg)),
                Role::Tool => api_messages.push(tool_result_to_anthropic(msg)),
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": api_messages,
            "max_tokens": params.max_tokens,
            "stream": true,
        });

        if let Some(system) = &params.system_prompt {
            body["system"] = Value::String(system.clone());
        }
        if !params.tools.is_empty() {
            let tools: Vec<Value> = params.tools.iter().map(tool_to_anthropic).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = params.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if !params.stop_sequences.is_empty() {
            body["stop_sequences"] = serde_json::json!(params.stop_sequences);
        }

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn user_msg_to_anthropic(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": "user",
            "content": t,
        }),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => serde_json::json!({
                        "type": "text",
                        "text": text,
                    }),
                    ContentPart::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": content,
                        "is_error": is_error,
                    }),
                    ContentPart::ToolUse { .. } => serde_json::json!({
                        "type": "text",
                        "text": "",
                    }),
                })
                .collect();
            serde_json::json!({
                "role": "user",
                "content": content,
            })
        }
    }
}

fn assistant_msg_to_anthropic(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": "assistant",
            "content": [{"type": "text", "text": t}],
        }),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(serde_json::json!({
                        "type": "text",
                        "text": text,
                    })),
                    ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                        "type": "tool_use",
                        "id": id,
                        "name": name,
                        "input": input,
                    })),
                    ContentPart::ToolResult { .. } => None,
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": content,
            })
        }
    }
}

fn tool_result_to_anthropic(msg: &Message) -> Value {
    // Anthropic expects tool results as user messages with tool_result blocks.
    let content: Vec<Value> = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![serde_json::json!({
            "type": "text",
            "text": t,
        })],
    };
    serde_json::json!({
        "role": "user",
        "content": content,
    })
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable state carried across SSE data payloads for one stream.
#[derive(Default)]
struct StreamState {
    /// index → (tool_use_id, tool_name, accumulated input JSON).
    open_tool_blocks: HashMap<u64, (String, String, String)>,
    usage: TokenUsage,
    stop_reason: Option<StopReason>,
}

fn map_stop_reason(s: &str) -> StopReason {
    match s {
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

fn parse_stream_data(state: &mut StreamState, data: &str) -> Vec<Result<ChatEvent>> {
    let json: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    match json.get("type").and_then(|t| t.as_str()) {
        Some("message_start") => {
            let message = &json["message"];
            if let Some(u) = message.get("usage") {
                state.usage.input_tokens = u["input_tokens"].as_u64().unwrap_or(0) as u32;
                state.usage.cache_read_tokens = u
                    .get("cache_read_input_tokens")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32);
                state.usage.cache_write_tokens = u
                    .get("cache_creation_input_tokens")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32);
            }
            let message_id = message["id"].as_str().unwrap_or_default().to_string();
            vec![Ok(ChatEvent::MessageStart { message_id })]
        }
        Some("content_block_start") => {
            let index = json["index"].as_u64().unwrap_or(0);
            let block = &json["content_block"];
            if block["type"].as_str() == Some("tool_use") {
                let id = block["id"].as_str().unwrap_or_default().to_string();
                let name = block["name"].as_str().unwrap_or_default().to_string();
                state
                    .open_tool_blocks
                    .insert(index, (id.clone(), name.clone(), String::new()));
                vec![Ok(ChatEvent::ToolUseStart { id, name })]
            } else {
                Vec::new()
            }
        }
        Some("content_block_delta") => {
            let index = json["index"].as_u64().unwrap_or(0);
            let delta = &json["delta"];
            match delta["type"].as_str() {
                Some("text_delta") => {
                    let text = delta["text"].as_str().unwrap_or_default().to_string();
                    vec![Ok(ChatEvent::ContentDelta { text })]
                }
                Some("input_json_delta") => {
                    let fragment = delta["partial_json"].as_str().unwrap_or_default();
                    if let Some((id, _, buf)) = state.open_tool_blocks.get_mut(&index) {
                        buf.push_str(fragment);
                        vec![Ok(ChatEvent::ToolUseDelta {
                            id: id.clone(),
                            partial_input: fragment.to_string(),
                        })]
                    } else {
                        Vec::new()
                    }
                }
                _ => Vec::new(),
            }
        }
        Some("content_block_stop") => {
            let index = json["index"].as_u64().unwrap_or(0);
            if let Some((id, name, buf)) = state.open_tool_blocks.remove(&index) {
                let input = parse_tool_input(&name, &buf);
                vec![Ok(ChatEvent::ToolUseEnd { id, name, input })]
            } else {
                Vec::new()
            }
        }
        Some("message_delta") => {
            if let Some(reason) = json["delta"]["stop_reason"].as_str() {
                state.stop_reason = Some(map_stop_reason(reason));
            }
            if let Some(u) = json.get("usage") {
                state.usage.output_tokens = u["output_tokens"].as_u64().unwrap_or(0) as u32;
            }
            Vec::new()
        }
        Some("message_stop") => {
            vec![Ok(ChatEvent::MessageEnd {
                stop_reason: state.stop_reason.unwrap_or(StopReason::EndTurn),
                usage: std::mem::take(&mut state.usage),
            })]
        }
        Some("error") => {
            let cause = json["error"]["message"]
                .as_str()
                .unwrap_or("unknown streaming error")
                .to_string();
            vec![Ok(ChatEvent::Error { cause })]
        }
        // ping and unknown frames are ignored.
        _ => Vec::new(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderAdapter implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn chat(&self, params: &ChatParams) -> Result<BoxStream<'static, Result<ChatEvent>>> {
        let body = self.build_body(params);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("x-trace-id", params.trace_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER_ID, status.as_u16(), &text));
        }

        let mut state = StreamState::default();
        Ok(sse_event_stream(PROVIDER_ID, response, move |data| {
            parse_stream_data(&mut state, data)
        }))
    }

    fn count_tokens(&self, messages: &[Message]) -> u32 {
        estimate_tokens(messages)
    }

    fn context_window(&self) -> u32 {
        self.context_window
    }

    fn supports_tool_use(&self) -> bool {
        true
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut StreamState, data: &str) -> Vec<ChatEvent> {
        parse_stream_data(state, data)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn full_tool_use_stream_brackets_events() {
        let mut state = StreamState::default();

        let evs = feed(
            &mut state,
            r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":42}}}"#,
        );
        assert!(matches!(&evs[0], ChatEvent::MessageStart { message_id } if message_id == "msg_1"));

        let evs = feed(
            &mut state,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"calculator"}}"#,
        );
        assert!(matches!(&evs[0], ChatEvent::ToolUseStart { id, name } if id == "tu_1" && name == "calculator"));

        feed(
            &mut state,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"expression\":"}}"#,
        );
        feed(
            &mut state,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"2+2\"}"}}"#,
        );

        let evs = feed(&mut state, r#"{"type":"content_block_stop","index":0}"#);
        match &evs[0] {
            ChatEvent::ToolUseEnd { id, name, input } => {
                assert_eq!(id, "tu_1");
                assert_eq!(name, "calculator");
                assert_eq!(input["expression"], "2+2");
            }
            other => panic!("expected ToolUseEnd, got {other:?}"),
        }

        feed(
            &mut state,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":17}}"#,
        );
        let evs = feed(&mut state, r#"{"type":"message_stop"}"#);
        match &evs[0] {
            ChatEvent::MessageEnd { stop_reason, usage } => {
                assert_eq!(*stop_reason, StopReason::ToolUse);
                assert_eq!(usage.input_tokens, 42);
                assert_eq!(usage.output_tokens, 17);
            }
            other => panic!("expected MessageEnd, got {other:?}"),
        }
    }

    #[test]
    fn text_delta_maps_to_content_delta() {
        let mut state = StreamState::default();
        let evs = feed(
            &mut state,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
        );
        assert!(matches!(&evs[0], ChatEvent::ContentDelta { text } if text == "Hello"));
    }

    #[test]
    fn malformed_tool_input_yields_empty_object() {
        let mut state = StreamState::default();
        feed(
            &mut state,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"t"}}"#,
        );
        feed(
            &mut state,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"broken\":"}}"#,
        );
        let evs = feed(&mut state, r#"{"type":"content_block_stop","index":0}"#);
        match &evs[0] {
            ChatEvent::ToolUseEnd { input, .. } => assert_eq!(input, &serde_json::json!({})),
            other => panic!("expected ToolUseEnd, got {other:?}"),
        }
    }

    #[test]
    fn vendor_error_surfaces_as_error_event() {
        let mut state = StreamState::default();
        let evs = feed(
            &mut state,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert!(matches!(&evs[0], ChatEvent::Error { cause } if cause == "Overloaded"));
    }

    #[test]
    fn ping_frames_are_ignored() {
        let mut state = StreamState::default();
        assert!(feed(&mut state, r#"{"type":"ping"}"#).is_empty());
    }

    #[test]
    fn body_separates_system_and_tools() {
        let spec = ProviderSpec {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key_env_var: "NEXUS_TEST_ANTHROPIC_KEY".into(),
            base_url: None,
            temperature: Some(0.2),
            max_tokens: 1024,
        };
        std::env::set_var("NEXUS_TEST_ANTHROPIC_KEY", "sk-test");
        let adapter = AnthropicAdapter::from_spec(&spec, reqwest::Client::new()).unwrap();
        std::env::remove_var("NEXUS_TEST_ANTHROPIC_KEY");

        let params = ChatParams {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "calculator".into(),
                description: "evaluate arithmetic".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }],
            system_prompt: Some("be brief".into()),
            max_tokens: 1024,
            temperature: Some(0.2),
            stop_sequences: vec![],
            trace_id: uuid::Uuid::new_v4(),
        };
        let body = adapter.build_body(&params);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["tools"][0]["name"], "calculator");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], true);
    }
}
