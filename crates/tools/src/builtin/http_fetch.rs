//! HTTP GET tool with a response-size cap.
//!
//! Reads remote state but mutates nothing, so it is treated as
//! side-effect-free for dry-run purposes while still carrying medium risk
//! (it reaches the network on the agent's behalf).

use serde_json::Value;

use nexus_domain::approval::RiskLevel;
use nexus_domain::error::{Error, Result};

use crate::{ExecutableTool, ExecutionContext, ToolResult};

const MAX_RESPONSE_BYTES: usize = 256 * 1024;

pub struct HttpFetchTool {
    client: reqwest::Client,
}

impl HttpFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ExecutableTool for HttpFetchTool {
    fn id(&self) -> &str {
        "http_fetch"
    }
    fn name(&self) -> &str {
        "http_fetch"
    }
    fn description(&self) -> &str {
        "Fetch a URL via HTTP GET and return the response body (truncated to 256 KiB)."
    }
    fn category(&self) -> &str {
        "web"
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {"type": "string", "description": "The http(s) URL to fetch"}
            }
        })
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn side_effects(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let url = input["url"]
            .as_str()
            .ok_or_else(|| Error::Validation("url must be a string".into()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Validation(format!("unsupported URL scheme: {url}")));
        }
        if ctx.cancel.is_cancelled() {
            return Ok(ToolResult::err("canceled", 0));
        }

        let started = std::time::Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ToolExecution(format!("fetch {url}: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ToolExecution(format!("read body from {url}: {e}")))?;

        let truncated = body.len() > MAX_RESPONSE_BYTES;
        let mut text = body;
        if truncated {
            let mut end = MAX_RESPONSE_BYTES;
            while !text.is_char_boundary(end) && end > 0 {
                end -= 1;
            }
            text.truncate(end);
        }

        Ok(ToolResult {
            success: status < 400,
            output: serde_json::json!({
                "status": status,
                "body": text,
                "truncated": truncated,
            }),
            error: (status >= 400).then(|| format!("HTTP {status}")),
            duration_ms: started.elapsed().as_millis() as u64,
            metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_context;

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let ctx = test_context();
        let err = HttpFetchTool::new()
            .execute(serde_json::json!({"url": "file:///etc/passwd"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn canceled_context_short_circuits() {
        let ctx = test_context();
        ctx.cancel.cancel();
        let result = HttpFetchTool::new()
            .execute(serde_json::json!({"url": "https://example.com"}), &ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("canceled"));
    }
}
