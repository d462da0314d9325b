//! Health endpoint.

use axum::extract::State;
use axum::response::Response;

use crate::state::AppState;

use super::ok;

pub async fn health(State(state): State<AppState>) -> Response {
    ok(serde_json::json!({
        "status": "ok",
        "projects": state.projects.count().await,
        "tools": state.tools.len(),
        "mcpServers": state.mcp.server_count().await,
        "mcpTools": state.mcp.tool_count().await,
        "cachedProviders": state.providers.cached_count(),
        "activeSessionLocks": state.session_locks.len(),
    }))
}
