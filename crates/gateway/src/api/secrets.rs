//! Secret management — metadata only on reads; plaintext never leaves.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::state::AppState;

use super::{fail, ok, respond};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSecret {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn set(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Json(body): Json<SetSecret>,
) -> Response {
    if let Err(e) = state.projects.get(&pid).await {
        return fail(e);
    }
    respond(
        state
            .secrets
            .set(&pid, &body.key, &body.value, body.description)
            .await,
    )
}

pub async fn list(State(state): State<AppState>, Path(pid): Path<String>) -> Response {
    ok(state.secrets.list(&pid).await)
}

/// Metadata only — the decrypted value is available exclusively to
/// in-process consumers (tools, channel adapters).
pub async fn get(
    State(state): State<AppState>,
    Path((pid, key)): Path<(String, String)>,
) -> Response {
    let metadata = state
        .secrets
        .list(&pid)
        .await
        .into_iter()
        .find(|m| m.key == key);
    match metadata {
        Some(m) => ok(m),
        None => fail(nexus_domain::error::Error::SecretNotFound(format!(
            "{pid}/{key}"
        ))),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    Path((pid, key)): Path<(String, String)>,
) -> Response {
    respond(
        state
            .secrets
            .delete(&pid, &key)
            .await
            .map(|_| serde_json::json!({"deleted": key})),
    )
}
