//! Current-time tool.

use serde_json::Value;

use nexus_domain::approval::RiskLevel;
use nexus_domain::error::Result;

use crate::{ExecutableTool, ExecutionContext, ToolResult};

pub struct ClockTool;

#[async_trait::async_trait]
impl ExecutableTool for ClockTool {
    fn id(&self) -> &str {
        "clock"
    }
    fn name(&self) -> &str {
        "clock"
    }
    fn description(&self) -> &str {
        "Return the current UTC date and time in RFC 3339 format."
    }
    fn category(&self) -> &str {
        "utility"
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
    fn side_effects(&self) -> bool {
        false
    }

    async fn execute(&self, _input: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        Ok(ToolResult::ok(Value::String(now), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_context;

    #[tokio::test]
    async fn returns_rfc3339_utc() {
        let ctx = test_context();
        let result = ClockTool
            .execute(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(result.success);
        let text = result.output_text();
        assert!(text.ends_with('Z'), "expected UTC timestamp, got {text}");
        assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());
    }
}
