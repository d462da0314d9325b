//! Executable tools and the registry that holds them.
//!
//! A tool declares its schema and risk level and executes inside an
//! [`ExecutionContext`]. `dry_run` must never perform side effects: pure
//! tools delegate to `execute`, effectful ones synthesize a preview.

pub mod builtin;
pub mod registry;
pub mod schema;

use std::time::Instant;

use serde_json::Value;

use nexus_domain::approval::RiskLevel;
use nexus_domain::cancel::CancelToken;
use nexus_domain::error::{Error, Result};
use nexus_domain::project::AgentConfig;
use nexus_domain::tool::ToolDefinition;

pub use registry::ToolRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution context & result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a tool may need while executing, scoped to one turn.
#[derive(Clone)]
pub struct ExecutionContext {
    pub project_id: String,
    pub session_id: uuid::Uuid,
    pub trace_id: uuid::Uuid,
    pub agent_config: AgentConfig,
    /// Tool ids the project permits.
    pub allowed_tools: Vec<String>,
    pub cancel: CancelToken,
}

/// Uniform result of a tool execution or dry run.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms,
            metadata: None,
        }
    }

    pub fn err(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(message.into()),
            duration_ms,
            metadata: None,
        }
    }

    /// Render the output for a tool_result content part.
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            Value::Null => self.error.clone().unwrap_or_default(),
            other => other.to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ExecutableTool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every tool must implement.
#[async_trait::async_trait]
pub trait ExecutableTool: Send + Sync {
    /// Globally unique id. MCP-sourced tools are namespaced
    /// `mcp:<prefix>:<name>`.
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str;
    /// JSON Schema for the input payload.
    fn input_schema(&self) -> Value;
    fn output_schema(&self) -> Option<Value> {
        None
    }
    fn risk_level(&self) -> RiskLevel;
    fn requires_approval(&self) -> bool {
        self.risk_level().requires_approval()
    }
    fn side_effects(&self) -> bool;
    fn supports_dry_run(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<ToolResult>;

    /// Side-effect-free preview. Pure tools run for real; effectful tools
    /// return a synthesized preview of what would happen.
    async fn dry_run(&self, input: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        if self.side_effects() {
            Ok(ToolResult::ok(
                serde_json::json!({
                    "dryRun": true,
                    "tool": self.id(),
                    "wouldExecuteWith": input,
                }),
                0,
            ))
        } else {
            self.execute(input, ctx).await
        }
    }

    /// Liveness probe; defaults to healthy.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// The definition handed to the LLM.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.id().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Validate input against the tool's schema, execute, and time the call.
///
/// A thrown error becomes an unsuccessful `ToolResult` — tool failures are
/// captured, never fatal to the turn.
pub async fn execute_validated(
    tool: &dyn ExecutableTool,
    input: Value,
    ctx: &ExecutionContext,
) -> ToolResult {
    let started = Instant::now();

    let violations = schema::validate(&tool.input_schema(), &input);
    if !violations.is_empty() {
        return ToolResult::err(
            format!("input validation failed: {}", violations.join("; ")),
            started.elapsed().as_millis() as u64,
        );
    }

    match tool.execute(input, ctx).await {
        Ok(mut result) => {
            if result.duration_ms == 0 {
                result.duration_ms = started.elapsed().as_millis() as u64;
            }
            result
        }
        Err(e) => {
            tracing::warn!(tool = tool.id(), error = %e, "tool execution failed");
            ToolResult::err(
                Error::ToolExecution(e.to_string()).to_string(),
                started.elapsed().as_millis() as u64,
            )
        }
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> ExecutionContext {
    use nexus_domain::project::{AgentConfig, ProviderSpec};
    ExecutionContext {
        project_id: "P1".into(),
        session_id: uuid::Uuid::new_v4(),
        trace_id: uuid::Uuid::new_v4(),
        agent_config: AgentConfig {
            provider: ProviderSpec {
                provider: "anthropic".into(),
                model: "claude-sonnet-4-20250514".into(),
                api_key_env_var: "UNUSED".into(),
                base_url: None,
                temperature: None,
                max_tokens: 4096,
            },
            failover: Default::default(),
            allowed_tools: vec!["calculator".into()],
            memory: Default::default(),
            cost: Default::default(),
        },
        allowed_tools: vec!["calculator".into()],
        cancel: CancelToken::new(),
    }
}
