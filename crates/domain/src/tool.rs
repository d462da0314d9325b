use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_id: String,
    pub input: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// An assistant message carrying text (if any) plus tool_use parts,
    /// in declaration order.
    pub fn assistant_tool_uses(text: &str, calls: &[ToolCall]) -> Self {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(ContentPart::Text { text: text.to_string() });
        }
        for call in calls {
            parts.push(ContentPart::ToolUse {
                id: call.call_id.clone(),
                name: call.tool_id.clone(),
                input: call.input.clone(),
            });
        }
        Self {
            role: Role::Assistant,
            content: MessageContent::Parts(parts),
        }
    }

    /// A user message carrying tool_result parts paired to prior tool_use
    /// parts, in the same order.
    pub fn tool_results(results: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(results),
        }
    }
}

impl ContentPart {
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        ContentPart::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

impl MessageContent {
    /// Extract and join all text content, returning an owned String.
    ///
    /// For `Text`, returns the string directly. For `Parts`, joins all
    /// `Text` parts with `"\n"`; tool parts are skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Rough character length across all parts, used by the token estimator.
    pub fn char_len(&self) -> usize {
        match self {
            MessageContent::Text(t) => t.len(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::ToolUse { input, .. } => input.to_string().len(),
                    ContentPart::ToolResult { content, .. } => content.len(),
                })
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_from_parts_joins_with_newline() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "line one".into() },
            ContentPart::ToolUse {
                id: "c1".into(),
                name: "calculator".into(),
                input: serde_json::json!({}),
            },
            ContentPart::Text { text: "line two".into() },
        ]);
        assert_eq!(content.extract_all_text(), "line one\nline two");
    }

    #[test]
    fn assistant_tool_uses_preserves_order() {
        let calls = vec![
            ToolCall {
                call_id: "tc_a".into(),
                tool_id: "read".into(),
                input: serde_json::json!({}),
            },
            ToolCall {
                call_id: "tc_b".into(),
                tool_id: "write".into(),
                input: serde_json::json!({"path": "/tmp"}),
            },
        ];
        let msg = Message::assistant_tool_uses("thinking...", &calls);
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(&parts[0], ContentPart::Text { .. }));
                match &parts[1] {
                    ContentPart::ToolUse { id, .. } => assert_eq!(id, "tc_a"),
                    _ => panic!("expected ToolUse"),
                }
                match &parts[2] {
                    ContentPart::ToolUse { id, .. } => assert_eq!(id, "tc_b"),
                    _ => panic!("expected ToolUse"),
                }
            }
            _ => panic!("expected Parts content"),
        }
    }

    #[test]
    fn empty_text_not_included_in_tool_use_message() {
        let msg = Message::assistant_tool_uses("", &[]);
        match &msg.content {
            MessageContent::Parts(parts) => assert!(parts.is_empty()),
            _ => panic!("expected Parts content"),
        }
    }

    #[test]
    fn char_len_counts_tool_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "abcd".into() },
            ContentPart::tool_result("tc_1", "12345678", false),
        ]);
        assert_eq!(content.char_len(), 12);
    }
}
