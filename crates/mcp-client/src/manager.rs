//! MCP manager — holds all MCP server connections and orchestrates tool
//! discovery and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use nexus_domain::config::{McpConfig, McpServerConfig, McpTransportKind};

use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{McpTransport, SseTransport, StdioTransport, TransportError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One MCP server connection. The tool list is snapshotted at connect;
/// reconnecting re-runs discovery.
pub struct McpServer {
    pub name: String,
    pub prefix: String,
    pub tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
}

impl McpServer {
    /// Initialize a server: spawn the process (or connect via SSE),
    /// perform the MCP handshake, and discover tools.
    async fn initialize(config: &McpServerConfig) -> Result<Self, McpError> {
        let transport: Box<dyn McpTransport> = match config.transport {
            McpTransportKind::Stdio => {
                Box::new(StdioTransport::spawn(config).map_err(McpError::Transport)?)
            }
            McpTransportKind::Sse => {
                Box::new(SseTransport::connect(config).map_err(McpError::Transport)?)
            }
        };

        // Step 1: initialize handshake.
        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| McpError::Protocol(format!("serialize initialize params: {e}")))?;

        let resp = transport
            .send_request("initialize", Some(params_value))
            .await
            .map_err(McpError::Transport)?;
        if let Err(err) = resp.into_result() {
            return Err(McpError::Protocol(format!("initialize failed: {err}")));
        }

        // Step 2: initialized notification.
        transport
            .send_notification("notifications/initialized")
            .await
            .map_err(McpError::Transport)?;

        // Step 3: snapshot the tool list.
        let tools_resp = transport
            .send_request("tools/list", None)
            .await
            .map_err(McpError::Transport)?;

        let tools = match tools_resp.into_result() {
            Ok(result) => match serde_json::from_value::<ToolsListResult>(result) {
                Ok(r) => r.tools,
                Err(e) => {
                    tracing::warn!(
                        server = %config.name,
                        error = %e,
                        "failed to parse tools/list result"
                    );
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!(
                    server = %config.name,
                    error = %err,
                    "tools/list returned error, server will have no tools"
                );
                Vec::new()
            }
        };

        tracing::info!(
            server = %config.name,
            tool_count = tools.len(),
            "MCP server initialized"
        );

        Ok(Self {
            name: config.name.clone(),
            prefix: config.tool_prefix().to_string(),
            tools,
            transport,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Call a tool on this server.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.name.clone()));
        }

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments
        });

        let resp = self
            .transport
            .send_request("tools/call", Some(params))
            .await
            .map_err(McpError::Transport)?;

        let result = resp
            .into_result()
            .map_err(|err| McpError::ToolExecution(format!("tools/call failed: {err}")))?;

        serde_json::from_value::<ToolCallResult>(result)
            .map_err(|e| McpError::Protocol(format!("parse tools/call result: {e}")))
    }

    async fn shutdown(&self) {
        tracing::info!(server = %self.name, "shutting down MCP server");
        self.transport.shutdown().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Manager that holds all MCP server connections, keyed by server name.
pub struct McpManager {
    servers: RwLock<HashMap<String, Arc<McpServer>>>,
}

impl McpManager {
    /// Create an empty manager (no MCP servers configured).
    pub fn empty() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Connect every configured server in parallel. Servers that fail to
    /// initialize are logged and skipped — a partial fleet is acceptable.
    pub async fn connect_all(config: &McpConfig) -> Self {
        let manager = Self::empty();

        let connects = config.servers.iter().map(|server_config| async {
            tracing::info!(
                server = %server_config.name,
                transport = ?server_config.transport,
                "initializing MCP server"
            );
            (
                server_config.name.clone(),
                McpServer::initialize(server_config).await,
            )
        });

        let results = futures_util::future::join_all(connects).await;

        {
            let mut servers = manager.servers.write().await;
            for (name, result) in results {
                match result {
                    Ok(server) => {
                        servers.insert(name, Arc::new(server));
                    }
                    Err(e) => {
                        tracing::warn!(
                            server = %name,
                            error = %e,
                            "failed to initialize MCP server, skipping"
                        );
                    }
                }
            }
            if !servers.is_empty() {
                tracing::info!(count = servers.len(), "MCP manager ready");
            }
        }

        manager
    }

    /// Reconnect one server, forcing tool re-discovery.
    pub async fn reconnect(&self, config: &McpServerConfig) -> Result<(), McpError> {
        if let Some(old) = self.servers.write().await.remove(&config.name) {
            old.shutdown().await;
        }
        let server = McpServer::initialize(config).await?;
        self.servers
            .write()
            .await
            .insert(config.name.clone(), Arc::new(server));
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<McpServer>> {
        self.servers.read().await.get(name).cloned()
    }

    /// All connected servers, for tool registration and health reporting.
    pub async fn servers(&self) -> Vec<Arc<McpServer>> {
        self.servers.read().await.values().cloned().collect()
    }

    /// Call a tool on a specific server.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        let server = self
            .get(server_name)
            .await
            .ok_or_else(|| McpError::ServerNotFound(server_name.to_string()))?;
        server.call_tool(tool_name, arguments).await
    }

    /// Close one connection and remove it.
    pub async fn disconnect(&self, name: &str) -> bool {
        if let Some(server) = self.servers.write().await.remove(name) {
            server.shutdown().await;
            true
        } else {
            false
        }
    }

    /// Shut down every server concurrently.
    pub async fn disconnect_all(&self) {
        let servers: Vec<Arc<McpServer>> = self.servers.write().await.drain().map(|(_, s)| s).collect();
        let futs: Vec<_> = servers.iter().map(|s| s.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }

    pub async fn server_count(&self) -> usize {
        self.servers.read().await.len()
    }

    pub async fn tool_count(&self) -> usize {
        self.servers
            .read()
            .await
            .values()
            .filter(|s| s.is_alive())
            .map(|s| s.tools.len())
            .sum()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors specific to MCP operations, classified per the runtime's error
/// vocabulary: connection, tool execution, timeout.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP tool execution error: {0}")]
    ToolExecution(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP server is down: {0}")]
    ServerDown(String),
}

impl From<McpError> for nexus_domain::error::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::Transport(TransportError::Timeout) => {
                nexus_domain::error::Error::McpTimeout(e.to_string())
            }
            McpError::ToolExecution(msg) => nexus_domain::error::Error::McpToolExecution(msg),
            other => nexus_domain::error::Error::McpConnection(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_manager_has_no_servers() {
        let manager = McpManager::empty();
        assert_eq!(manager.server_count().await, 0);
        assert_eq!(manager.tool_count().await, 0);
        assert!(!manager.disconnect("ghost").await);
    }

    #[tokio::test]
    async fn call_tool_on_unknown_server_fails() {
        let manager = McpManager::empty();
        let err = manager
            .call_tool("nope", "tool", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ServerNotFound(_)));
    }

    #[tokio::test]
    async fn connect_all_skips_failing_servers() {
        // A stdio server whose command does not exist must be skipped,
        // not fail the whole fleet.
        let config = McpConfig {
            servers: vec![McpServerConfig {
                name: "broken".into(),
                transport: McpTransportKind::Stdio,
                command: Some("/nonexistent/mcp-server-binary".into()),
                args: vec![],
                env: Default::default(),
                url: None,
                prefix: None,
                request_timeout_ms: 1000,
            }],
        };
        let manager = McpManager::connect_all(&config).await;
        assert_eq!(manager.server_count().await, 0);
    }

    #[test]
    fn timeout_maps_to_mcp_timeout_error() {
        let err: nexus_domain::error::Error = McpError::Transport(TransportError::Timeout).into();
        assert_eq!(err.code(), "MCP_TIMEOUT");

        let err: nexus_domain::error::Error = McpError::ToolExecution("boom".into()).into();
        assert_eq!(err.code(), "MCP_TOOL_EXECUTION_ERROR");

        let err: nexus_domain::error::Error = McpError::ServerDown("files".into()).into();
        assert_eq!(err.code(), "MCP_CONNECTION_ERROR");
    }
}
