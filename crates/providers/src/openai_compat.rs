//! OpenAI-compatible adapter.
//!
//! Targets any endpoint speaking the chat-completions wire format
//! (OpenAI itself and the long tail of compatible vendors). Tool calls
//! stream as indexed argument fragments; they are assembled per index and
//! closed when the stream reports a finish reason.

use std::collections::BTreeMap;

use serde_json::Value;

use nexus_domain::error::Result;
use nexus_domain::project::ProviderSpec;
use nexus_domain::stream::{BoxStream, ChatEvent, StopReason, TokenUsage};
use nexus_domain::tool::{ContentPart, Message, MessageContent, Role};

use crate::sse::{parse_tool_input, sse_event_stream};
use crate::traits::{ChatParams, ProviderAdapter};
use crate::util::{estimate_tokens, from_reqwest, resolve_api_key, status_error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER_ID: &str = "openai";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM adapter for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiCompatAdapter {
    base_url: String,
    api_key: String,
    model: String,
    context_window: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("context_window", &self.context_window)
            .finish()
    }
}

impl OpenAiCompatAdapter {
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
            context_window: 128_000,
            client,
        })
    }

    fn build_body(&self, params: &ChatParams) -> Value {
        let mut api_messages: Vec<Value> = Vec::new();

        if let Some(system) = &params.system_prompt {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }
        for msg in &params.messages {
            match msg.role {
                Role::System => api_messages.push(serde_json::json!({
                    "role": "system",
                    "content": msg.content.extract_all_text(),
                })),
                Role::User => match &msg.content {
                    MessageContent::Parts(parts)
                        if parts
                            .iter()
                            .any(|p| matches!(p, ContentPart::ToolResult { .. })) =>
                    {
                        // Tool results become individual role=tool messages,
                        // preserving part order.
                        for p in parts {
                            if let ContentPart::ToolResult {
                                tool_use_id,
                                content,
                                ..
                            } = p
                            {
                                api_messages.push(serde_json::json!({
                                    "role": "tool",
                                    "tool_call_id": tool_use_id,
                                    "content": content,
                                }));
                            }
                        }
                    }
                    _ => api_messages.push(serde_json::json!({
                        "role": "user",
                        "content": msg.content.extract_all_text(),
                    })),
                },
                Role::Assistant => api_messages.push(assistant_msg_to_openai(msg)),
                Role::Tool => {
                    if let MessageContent::Parts(parts) = &msg.content {
                        for p in parts {
                            if let ContentPart::ToolResult {
                                tool_use_id,
                                content,
                                ..
                            } = p
                            {
                                api_messages.push(serde_json::json!({
                                    "role": "tool",
                                    "tool_call_id": tool_use_id,
                                    "content": content,
                                }));
                            }
                        }
                    }
                }
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": api_messages,
            "max_tokens": params.max_tokens,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !params.tools.is_empty() {
            let tools: Vec<Value> = params
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = params.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if !params.stop_sequences.is_empty() {
            body["stop"] = serde_json::json!(params.stop_sequences);
        }

        body
    }
}

fn assistant_msg_to_openai(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": "assistant",
            "content": t,
        }),
        MessageContent::Parts(parts) => {
            let text = msg.content.extract_all_text();
            let tool_calls: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": input.to_string(),
                        }
                    })),
                    _ => None,
                })
                .collect();

            let mut m = serde_json::json!({
                "role": "assistant",
                "content": if text.is_empty() { Value::Null } else { Value::String(text) },
            });
            if !tool_calls.is_empty() {
                m["tool_calls"] = Value::Array(tool_calls);
            }
            m
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable state carried across SSE chunks for one stream.
#[derive(Default)]
struct StreamState {
    started: bool,
    /// tool-call index → (call id, name, accumulated argument JSON).
    /// BTreeMap so close-out preserves declaration order.
    tool_calls: BTreeMap<u64, (String, String, String)>,
    finish_reason: Option<StopReason>,
    usage: TokenUsage,
}

fn map_finish_reason(s: &str) -> StopReason {
    match s {
        "tool_calls" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

/// Close any open tool-call buffers, in index order.
fn close_tool_calls(state: &mut StreamState) -> Vec<Result<ChatEvent>> {
    let calls = std::mem::take(&mut state.tool_calls);
    calls
        .into_values()
        .map(|(id, name, buf)| {
            let input = parse_tool_input(&name, &buf);
            Ok(ChatEvent::ToolUseEnd { id, name, input })
        })
        .collect()
}

fn parse_stream_data(state: &mut StreamState, data: &str) -> Vec<Result<ChatEvent>> {
    if data == "[DONE]" {
        let mut events = close_tool_calls(state);
        events.push(Ok(ChatEvent::MessageEnd {
            stop_reason: state.finish_reason.unwrap_or(StopReason::EndTurn),
            usage: std::mem::take(&mut state.usage),
        }));
        return events;
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let mut events: Vec<Result<ChatEvent>> = Vec::new();

    if !state.started {
        state.started = true;
        let message_id = json["id"].as_str().unwrap_or_default().to_string();
        events.push(Ok(ChatEvent::MessageStart { message_id }));
    }

    // The usage-only final chunk has an empty choices array.
    if let Some(u) = json.get("usage").filter(|u| !u.is_null()) {
        state.usage.input_tokens = u["prompt_tokens"].as_u64().unwrap_or(0) as u32;
        state.usage.output_tokens = u["completion_tokens"].as_u64().unwrap_or(0) as u32;
    }

    let Some(choice) = json["choices"].as_array().and_then(|c| c.first()) else {
        return events;
    };

    let delta = &choice["delta"];
    if let Some(text) = delta["content"].as_str() {
        if !text.is_empty() {
            events.push(Ok(ChatEvent::ContentDelta {
                text: text.to_string(),
            }));
        }
    }

    if let Some(tool_deltas) = delta["tool_calls"].as_array() {
        for td in tool_deltas {
            let index = td["index"].as_u64().unwrap_or(0);
            let entry = state
                .tool_calls
                .entry(index)
                .or_insert_with(|| (String::new(), String::new(), String::new()));

            if let Some(id) = td["id"].as_str() {
                entry.0 = id.to_string();
            }
            if let Some(name) = td["function"]["name"].as_str() {
                let first_sight = entry.1.is_empty();
                entry.1.push_str(name);
                if first_sight {
                    events.push(Ok(ChatEvent::ToolUseStart {
                        id: entry.0.clone(),
                        name: entry.1.clone(),
                    }));
                }
            }
            if let Some(args) = td["function"]["arguments"].as_str() {
                entry.2.push_str(args);
                events.push(Ok(ChatEvent::ToolUseDelta {
                    id: entry.0.clone(),
                    partial_input: args.to_string(),
                }));
            }
        }
    }

    if let Some(reason) = choice["finish_reason"].as_str() {
        state.finish_reason = Some(map_finish_reason(reason));
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderAdapter implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    async fn chat(&self, params: &ChatParams) -> Result<BoxStream<'static, Result<ChatEvent>>> {
        let body = self.build_body(params);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
    fn text_stream_produces_start_deltas_end() {
        let mut state = StreamState::default();

        let evs = feed(
            &mut state,
            r#"{"id":"chatcmpl-1","choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        );
        assert!(matches!(&evs[0], ChatEvent::MessageStart { .. }));
        assert!(matches!(&evs[1], ChatEvent::ContentDelta { text } if text == "Hel"));

        feed(
            &mut state,
            r#"{"id":"chatcmpl-1","choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
        );
        feed(
            &mut state,
            r#"{"id":"chatcmpl-1","choices":[],"usage":{"prompt_tokens":9,"completion_tokens":2}}"#,
        );

        let evs = feed(&mut state, "[DONE]");
        match &evs[0] {
            ChatEvent::MessageEnd { stop_reason, usage } => {
                assert_eq!(*stop_reason, StopReason::EndTurn);
                assert_eq!(usage.input_tokens, 9);
                assert_eq!(usage.output_tokens, 2);
            }
            other => panic!("expected MessageEnd, got {other:?}"),
        }
    }

    #[test]
    fn tool_call_fragments_assemble_by_index() {
        let mut state = StreamState::default();

        let evs = feed(
            &mut state,
            r#"{"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"calculator","arguments":""}}]},"finish_reason":null}]}"#,
        );
        assert!(evs
            .iter()
            .any(|e| matches!(e, ChatEvent::ToolUseStart { id, name } if id == "call_a" && name == "calculator")));

        feed(
            &mut state,
            r#"{"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"expression\":"}}]},"finish_reason":null}]}"#,
        );
        feed(
            &mut state,
            r#"{"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"2+2\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        );

        let evs = feed(&mut state, "[DONE]");
        match &evs[0] {
            ChatEvent::ToolUseEnd { id, name, input } => {
                assert_eq!(id, "call_a");
                assert_eq!(name, "calculator");
                assert_eq!(input["expression"], "2+2");
            }
            other => panic!("expected ToolUseEnd, got {other:?}"),
        }
        assert!(matches!(
            &evs[1],
            ChatEvent::MessageEnd {
                stop_reason: StopReason::ToolUse,
                ..
            }
        ));
    }

    #[test]
    fn multiple_tool_calls_close_in_index_order() {
        let mut state = StreamState::default();
        feed(
            &mut state,
            r#"{"id":"c1","choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"second","arguments":"{}"}}]},"finish_reason":null}]}"#,
        );
        feed(
            &mut state,
            r#"{"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"first","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#,
        );
        let evs = feed(&mut state, "[DONE]");
        let names: Vec<&str> = evs
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ToolUseEnd { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn finish_reason_length_maps_to_max_tokens() {
        assert_eq!(map_finish_reason("length"), StopReason::MaxTokens);
        assert_eq!(map_finish_reason("stop"), StopReason::EndTurn);
        assert_eq!(map_finish_reason("tool_calls"), StopReason::ToolUse);
    }

    #[test]
    fn assistant_tool_use_message_serializes_tool_calls() {
        let msg = Message::assistant_tool_uses(
            "checking",
            &[nexus_domain::tool::ToolCall {
                call_id: "call_1".into(),
                tool_id: "calculator".into(),
                input: serde_json::json!({"expression": "1+1"}),
            }],
        );
        let v = assistant_msg_to_openai(&msg);
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["tool_calls"][0]["id"], "call_1");
        assert_eq!(v["tool_calls"][0]["function"]["name"], "calculator");
    }
}
