//! Runtime configuration, loaded from a TOML file with serde defaults.
//!
//! Per-project behavior lives in [`crate::project::AgentConfig`]; this file
//! covers process-level concerns: the HTTP bind address, the state
//! directory, scheduler cadence, webhook queue sizing, sanitizer caps, and
//! MCP server definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8700".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Dispatcher tick interval in seconds.
    pub tick_seconds: u64,
    /// Max concurrently executing task runs across projects.
    pub worker_pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 10,
            worker_pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookQueueConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    /// Base backoff in milliseconds, doubled per attempt.
    pub backoff_base_ms: u64,
}

impl Default for WebhookQueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            backoff_base_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    pub max_length: usize,
    pub strip_injection_patterns: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_length: 100_000,
            strip_injection_patterns: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// TTL for pending approvals, in seconds.
    pub ttl_seconds: i64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: crate::approval::DEFAULT_APPROVAL_TTL_SECONDS,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP server configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    Stdio,
    Sse,
}

/// One external MCP server. For stdio, `command` + `args` spawn a child
/// process; `env` maps child env names to *host env var names* which are
/// resolved through the process environment at spawn (unresolved names are
/// dropped, never passed empty). For SSE, `url` is the HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub transport: McpTransportKind,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Tool-id prefix; defaults to the server name.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_mcp_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_mcp_timeout_ms() -> u64 {
    30_000
}

impl McpServerConfig {
    pub fn tool_prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub servers: Vec<McpServerConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level runtime config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub server: ServerConfig,
    /// Root directory for the file-backed stores. Overridable via
    /// `NEXUS_STATE_DIR`.
    pub state_dir: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
    pub webhook_queue: WebhookQueueConfig,
    pub sanitizer: SanitizerConfig,
    pub approval: ApprovalConfig,
    pub mcp: McpConfig,
}

impl RuntimeConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw)
                .map_err(|e| Error::Validation(format!("config {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the state directory: config value, then `NEXUS_STATE_DIR`,
    /// then `./data`.
    pub fn resolve_state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        if let Ok(dir) = std::env::var("NEXUS_STATE_DIR") {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        PathBuf::from("./data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.scheduler.tick_seconds, 10);
        assert_eq!(cfg.webhook_queue.concurrency, 5);
        assert_eq!(cfg.webhook_queue.max_attempts, 3);
        assert_eq!(cfg.sanitizer.max_length, 100_000);
        assert!(cfg.sanitizer.strip_injection_patterns);
        assert_eq!(cfg.approval.ttl_seconds, 300);
        assert!(cfg.mcp.servers.is_empty());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = RuntimeConfig::load(Path::new("/nonexistent/nexus.toml")).unwrap();
        assert_eq!(cfg.server.bind_addr, "127.0.0.1:8700");
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nexus.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind_addr = "0.0.0.0:9000"

[scheduler]
tick_seconds = 5
worker_pool_size = 2

[[mcp.servers]]
name = "files"
transport = "stdio"
command = "mcp-files"
"#,
        )
        .unwrap();
        let cfg = RuntimeConfig::load(&path).unwrap();
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.scheduler.tick_seconds, 5);
        assert_eq!(cfg.mcp.servers.len(), 1);
        assert_eq!(cfg.mcp.servers[0].tool_prefix(), "files");
        assert_eq!(cfg.mcp.servers[0].request_timeout_ms, 30_000);
    }

    #[test]
    fn invalid_toml_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "server = 12").unwrap();
        let err = RuntimeConfig::load(&path).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
