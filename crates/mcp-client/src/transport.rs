//! MCP transport layer.
//!
//! - **Stdio**: spawn a child process, JSON-RPC over stdin/stdout.
//!   Child processes are single-consumer: full request/response cycles are
//!   serialized per connection.
//! - **Sse**: JSON-RPC over HTTP POST to the configured URL, responses
//!   delivered either as plain JSON or as an SSE `data:` frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use nexus_domain::config::McpServerConfig;

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Trait for MCP server transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the matching response.
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;

    /// Check if the transport is still alive.
    fn is_alive(&self) -> bool;

    /// Shut down the transport gracefully.
    async fn shutdown(&self);
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("MCP server process has exited")]
    ProcessExited,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("transport misconfigured: {0}")]
    Misconfigured(String),
}

/// Resolve the child environment from the config's env map.
///
/// Values are *host env var names*; each is looked up in the process
/// environment. Unresolved names are dropped — a child never sees an
/// empty-string secret.
pub(crate) fn resolve_child_env(
    env: &std::collections::HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut resolved = Vec::new();
    for (child_var, host_var) in env {
        match std::env::var(host_var) {
            Ok(value) if !value.is_empty() => resolved.push((child_var.clone(), value)),
            _ => {
                tracing::warn!(
                    child_var = %child_var,
                    host_var = %host_var,
                    "env var not resolvable, dropping from MCP server environment"
                );
            }
        }
    }
    resolved
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum number of non-JSON lines to skip before declaring the server broken.
const MAX_SKIP_LINES: usize = 1000;

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// Each JSON-RPC message is a single newline-delimited line. The
/// `request_lock` serializes entire request/response cycles so concurrent
/// callers cannot read each other's responses.
#[derive(Debug)]
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
    request_timeout: Duration,
}

impl StdioTransport {
    /// Spawn a child process from the given server config.
    pub fn spawn(config: &McpServerConfig) -> Result<Self, TransportError> {
        let command = config.command.as_deref().ok_or_else(|| {
            TransportError::Misconfigured(format!(
                "stdio server '{}' has no command configured",
                config.name
            ))
        })?;

        let mut cmd = tokio::process::Command::new(command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        for (key, value) in resolve_child_env(&config.env) {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(TransportError::Io)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read a line of JSON from stdout, skipping any empty or non-JSON
    /// lines. Gives up after [`MAX_SKIP_LINES`] to avoid spinning on a
    /// server that writes its logging to stdout.
    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "MCP server produced too many non-JSON lines on stdout",
                )));
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        // Serialize the entire cycle; stdio children are single-consumer.
        let _guard = self.request_lock.lock().await;

        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;

        tracing::debug!(id, method, "sending MCP request");
        self.write_line(&json).await?;

        // Read lines until we get a response matching our id. Servers may
        // interleave notifications (no `id`); those are skipped.
        let result = tokio::time::timeout(self.request_timeout, async {
            loop {
                let line = self.read_line().await?;
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) {
                    if resp.id == id {
                        return Ok(resp);
                    }
                    tracing::debug!(
                        expected_id = id,
                        got_id = resp.id,
                        "response for different request, continuing"
                    );
                }
                tracing::debug!(line = %line, "skipping non-matching message from MCP server");
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif)?;
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing MCP server stdin");
            }
        }
        // Give the process a moment to exit gracefully, then kill.
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(?status, "MCP server process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error waiting for MCP server process");
            }
            Err(_) => {
                tracing::warn!("MCP server process did not exit within timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill MCP server process");
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// SSE transport: JSON-RPC over HTTP POST to the server URL.
///
/// Responses may come back as plain JSON or as a single SSE event
/// (`data: {...}`); both shapes are accepted. Unlike stdio there is no
/// single-consumer constraint — requests may overlap.
pub struct SseTransport {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl SseTransport {
    pub fn connect(config: &McpServerConfig) -> Result<Self, TransportError> {
        let url = config.url.clone().ok_or_else(|| {
            TransportError::Misconfigured(format!(
                "sse server '{}' has no url configured",
                config.name
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            url,
            client,
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    fn parse_response_body(body: &str) -> Result<JsonRpcResponse, TransportError> {
        // Plain JSON first, then SSE-framed `data:` payloads.
        if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(body) {
            return Ok(resp);
        }
        for line in body.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(data.trim()) {
                    return Ok(resp);
                }
            }
        }
        Err(TransportError::Http(format!(
            "unparseable MCP response body: {}",
            &body[..body.len().min(200)]
        )))
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let response = self
            .client
            .post(&self.url)
            .header("accept", "application/json, text/event-stream")
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    self.alive.store(false, Ordering::SeqCst);
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(format!("HTTP {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Self::parse_response_body(&body)
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        self.client
            .post(&self.url)
            .json(&notif)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_child_env_drops_unresolved() {
        let host_var = "NEXUS_TEST_MCP_ENV_42";
        std::env::set_var(host_var, "secret-value");

        let mut env = std::collections::HashMap::new();
        env.insert("API_KEY".to_string(), host_var.to_string());
        env.insert("MISSING".to_string(), "NEXUS_TEST_MCP_NOT_SET_42".to_string());

        let resolved = resolve_child_env(&env);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0], ("API_KEY".to_string(), "secret-value".to_string()));

        std::env::remove_var(host_var);
    }

    #[test]
    fn resolve_child_env_drops_empty_values() {
        let host_var = "NEXUS_TEST_MCP_EMPTY_42";
        std::env::set_var(host_var, "");
        let mut env = std::collections::HashMap::new();
        env.insert("TOKEN".to_string(), host_var.to_string());
        assert!(resolve_child_env(&env).is_empty());
        std::env::remove_var(host_var);
    }

    #[test]
    fn sse_parses_plain_json_body() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#;
        let resp = SseTransport::parse_response_body(body).unwrap();
        assert_eq!(resp.id, 1);
        assert!(!resp.is_error());
    }

    #[test]
    fn sse_parses_event_stream_body() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{}}\n\n";
        let resp = SseTransport::parse_response_body(body).unwrap();
        assert_eq!(resp.id, 7);
    }

    #[test]
    fn sse_unparseable_body_is_http_error() {
        let err = SseTransport::parse_response_body("<html>nope</html>").unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }

    #[test]
    fn stdio_spawn_requires_command() {
        let config = McpServerConfig {
            name: "broken".into(),
            transport: nexus_domain::config::McpTransportKind::Stdio,
            command: None,
            args: vec![],
            env: Default::default(),
            url: None,
            prefix: None,
            request_timeout_ms: 1000,
        };
        let err = StdioTransport::spawn(&config).unwrap_err();
        assert!(matches!(err, TransportError::Misconfigured(_)));
    }
}
