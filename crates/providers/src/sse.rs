//! Shared SSE streaming infrastructure for all provider adapters.
//!
//! Every adapter follows the same pattern: receive a `reqwest::Response`,
//! buffer chunks, split on `\n\n`, extract `data:` payloads, and feed each
//! payload to a provider-specific parser that returns
//! `Vec<Result<ChatEvent>>`.
//!
//! - [`drain_data_lines`] — pull complete `data:` payloads from an SSE buffer
//! - [`sse_event_stream`] — build a `BoxStream` from a response + parser closure

use nexus_domain::error::Result;
use nexus_domain::stream::{BoxStream, ChatEvent, StopReason, TokenUsage};

use crate::util::from_reqwest;

/// Extract complete `data:` payloads from an SSE buffer.
///
/// SSE events are delimited by `\n\n`. Each event block may contain
/// `event:`, `data:`, `id:`, or `retry:` lines; only `data:` matters here.
///
/// The buffer is drained in-place: consumed bytes are removed and any
/// trailing partial event remains for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2); // remove the \n\n delimiter

        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a [`BoxStream`] of [`ChatEvent`]s from an SSE `reqwest::Response`
/// and a provider-specific parser closure.
///
/// The closure is `FnMut` because adapters keep mutable state across calls
/// (tool-input assembly buffers, pending stop reasons).
///
/// The stream automatically:
/// 1. Buffers incoming chunks and drains complete SSE events
/// 2. Flushes the remaining buffer when the response body closes
/// 3. Emits a fallback `message_end` if the parser never produced one, so
///    consumers always observe exactly one terminal event
pub(crate) fn sse_event_stream<F>(
    provider: &'static str,
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<ChatEvent>>
where
    F: FnMut(&str) -> Vec<Result<ChatEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut terminal_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));

                    for data in drain_data_lines(&mut buffer) {
                        for event in parse_data(&data) {
                            if matches!(
                                &event,
                                Ok(ChatEvent::MessageEnd { .. }) | Ok(ChatEvent::Error { .. })
                            ) {
                                terminal_emitted = true;
                            }
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    // Stream ended — flush any remaining partial event.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            for event in parse_data(&data) {
                                if matches!(
                                    &event,
                                    Ok(ChatEvent::MessageEnd { .. }) | Ok(ChatEvent::Error { .. })
                                ) {
                                    terminal_emitted = true;
                                }
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(provider, e));
                    terminal_emitted = true;
                    break;
                }
            }
        }

        if !terminal_emitted {
            yield Ok(ChatEvent::MessageEnd {
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            });
        }
    };

    Box::pin(stream)
}

/// Parse an accumulated tool-input fragment buffer into a JSON value.
///
/// Malformed or empty input defaults to an empty object (logged), never an
/// error — some models emit no arguments at all for zero-parameter tools.
pub(crate) fn parse_tool_input(tool_name: &str, fragments: &str) -> serde_json::Value {
    if fragments.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    match serde_json::from_str(fragments) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                tool = %tool_name,
                error = %e,
                "tool input is not valid JSON; defaulting to empty object"
            );
            serde_json::Value::Object(Default::default())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
