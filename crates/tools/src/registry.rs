//! Tool registry — registration, lookup, and per-project allowlists.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use nexus_domain::error::{Error, Result};
use nexus_domain::tool::ToolDefinition;

use crate::ExecutableTool;

/// Holds every registered tool, builtin and MCP-discovered alike.
///
/// Ids are unique across the registry; MCP-sourced ids carry the
/// `mcp:<prefix>:<name>` namespace so they can never collide with
/// builtins. A host-policy override map can force approval gating on a
/// per-id basis (used for MCP tools, which default to no approval).
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn ExecutableTool>>>,
    approval_overrides: RwLock<HashMap<String, bool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            approval_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool. Fails if the id is already taken.
    pub fn register(&self, tool: Arc<dyn ExecutableTool>) -> Result<()> {
        let id = tool.id().to_string();
        let mut tools = self.tools.write();
        if tools.contains_key(&id) {
            return Err(Error::Validation(format!(
                "tool id '{id}' is already registered"
            )));
        }
        tools.insert(id, tool);
        Ok(())
    }

    /// Remove every tool whose id starts with the given prefix. Used when
    /// an MCP server reconnects and its tool list is re-discovered.
    pub fn unregister_prefix(&self, prefix: &str) {
        self.tools.write().retain(|id, _| !id.starts_with(prefix));
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ExecutableTool>> {
        self.tools.read().get(id).cloned()
    }

    /// Tools permitted for a project, in stable id order.
    pub fn list_allowed(&self, allowed_tools: &[String]) -> Vec<Arc<dyn ExecutableTool>> {
        let tools = self.tools.read();
        let mut out: Vec<Arc<dyn ExecutableTool>> = allowed_tools
            .iter()
            .filter_map(|id| tools.get(id).cloned())
            .collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    /// LLM-facing definitions for a project's allowlist.
    pub fn definitions_for(&self, allowed_tools: &[String]) -> Vec<ToolDefinition> {
        self.list_allowed(allowed_tools)
            .iter()
            .map(|t| t.definition())
            .collect()
    }

    /// Force (or clear) approval gating for a tool id, overriding the
    /// tool's own declaration.
    pub fn set_requires_approval(&self, id: &str, requires: bool) {
        self.approval_overrides
            .write()
            .insert(id.to_string(), requires);
    }

    /// Effective approval requirement: host override, else the tool's own
    /// declaration, else risk-level gating.
    pub fn requires_approval(&self, tool: &dyn ExecutableTool) -> bool {
        if let Some(forced) = self.approval_overrides.read().get(tool.id()) {
            return *forced;
        }
        tool.requires_approval() || tool.risk_level().requires_approval()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the id for an MCP-discovered tool.
pub fn mcp_tool_id(prefix: &str, tool_name: &str) -> String {
    format!("mcp:{prefix}:{tool_name}")
}
