//! MCP (Model Context Protocol) client.
//!
//! Connects to external tool servers over stdio or SSE, discovers their
//! tools, and exposes them through the shared tool registry as
//! `mcp:<prefix>:<name>` executable tools.

pub mod adapter;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use adapter::register_mcp_tools;
pub use manager::{McpError, McpManager};
