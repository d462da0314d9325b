//! Adapts discovered MCP tools to the [`ExecutableTool`] contract.
//!
//! Discovered tools register as `mcp:<prefix>:<name>` with category `mcp`,
//! medium risk, and no approval requirement — host policy may override per
//! id through the registry.

use std::sync::Arc;

use serde_json::Value;

use nexus_domain::approval::RiskLevel;
use nexus_domain::error::Result;
use nexus_tools::registry::mcp_tool_id;
use nexus_tools::{ExecutableTool, ExecutionContext, ToolRegistry, ToolResult};

use crate::manager::McpManager;
use crate::protocol::McpToolDef;

/// An MCP-discovered tool exposed through the shared registry.
pub struct McpTool {
    id: String,
    server_name: String,
    remote_name: String,
    description: String,
    input_schema: Value,
    manager: Arc<McpManager>,
}

#[async_trait::async_trait]
impl ExecutableTool for McpTool {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.remote_name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn category(&self) -> &str {
        "mcp"
    }
    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn requires_approval(&self) -> bool {
        false
    }
    // Remote tools are assumed effectful; dry runs synthesize a preview.
    fn side_effects(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        if ctx.cancel.is_cancelled() {
            return Ok(ToolResult::err("canceled", 0));
        }
        let started = std::time::Instant::now();
        let result = self
            .manager
            .call_tool(&self.server_name, &self.remote_name, input)
            .await
            .map_err(nexus_domain::error::Error::from)?;

        let duration_ms = started.elapsed().as_millis() as u64;
        if result.is_error {
            Ok(ToolResult::err(result.text(), duration_ms))
        } else {
            Ok(ToolResult::ok(Value::String(result.text()), duration_ms))
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self
            .manager
            .get(&self.server_name)
            .await
            .is_some_and(|s| s.is_alive()))
    }
}

impl McpTool {
    pub fn new(
        manager: Arc<McpManager>,
        server_name: &str,
        prefix: &str,
        def: &McpToolDef,
    ) -> Self {
        Self {
            id: mcp_tool_id(prefix, &def.name),
            server_name: server_name.to_string(),
            remote_name: def.name.clone(),
            description: def.description.clone(),
            input_schema: def.input_schema.clone(),
            manager,
        }
    }
}

/// Register every tool discovered on every connected server. Existing
/// registrations under a server's prefix are replaced (reconnect path).
pub async fn register_mcp_tools(
    manager: &Arc<McpManager>,
    registry: &ToolRegistry,
) -> Result<usize> {
    let mut registered = 0usize;
    for server in manager.servers().await {
        registry.unregister_prefix(&format!("mcp:{}:", server.prefix));
        for def in &server.tools {
            let tool = McpTool::new(manager.clone(), &server.name, &server.prefix, def);
            match registry.register(Arc::new(tool)) {
                Ok(()) => registered += 1,
                Err(e) => {
                    tracing::warn!(
                        server = %server.name,
                        tool = %def.name,
                        error = %e,
                        "skipping MCP tool registration"
                    );
                }
            }
        }
    }
    Ok(registered)
}
