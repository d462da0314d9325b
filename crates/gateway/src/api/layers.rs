//! Prompt-layer versioning and activation.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use nexus_domain::layer::LayerType;

use crate::state::AppState;

use super::{fail, ok, respond};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLayer {
    pub layer_type: LayerType,
    pub content: String,
    pub created_by: String,
    pub change_reason: String,
    /// Activate immediately (deactivating the current version).
    #[serde(default)]
    pub activate: bool,
}

pub async fn create(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Json(body): Json<CreateLayer>,
) -> Response {
    if let Err(e) = state.projects.get(&pid).await {
        return fail(e);
    }
    respond(
        state
            .layers
            .create(
                &pid,
                body.layer_type,
                body.content,
                body.created_by,
                body.change_reason,
                body.activate,
            )
            .await,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub layer_type: Option<LayerType>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    ok(state.layers.list(&pid, query.layer_type).await)
}

pub async fn active(State(state): State<AppState>, Path(pid): Path<String>) -> Response {
    let active = state.layers.active_layers(&pid).await;
    let view: serde_json::Map<String, serde_json::Value> = active
        .into_iter()
        .map(|(lt, layer)| {
            (
                lt.as_str().to_string(),
                serde_json::to_value(layer).unwrap_or(serde_json::Value::Null),
            )
        })
        .collect();
    ok(view)
}

pub async fn activate(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    respond(state.layers.activate(id).await)
}
