//! Channel integrations CRUD and the inbound fan-in endpoint.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use nexus_domain::error::Error;

use crate::inbound;
use crate::inbound::channels::IntegrationConfig;
use crate::state::AppState;

use super::{fail, ok, respond};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertIntegration {
    pub channel: String,
    /// "log" or "http_push".
    pub kind: String,
    #[serde(default)]
    pub delivery_url: Option<String>,
}

pub async fn upsert(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Json(body): Json<UpsertIntegration>,
) -> Response {
    if let Err(e) = state.projects.get(&pid).await {
        return fail(e);
    }
    if body.kind == "http_push" && body.delivery_url.is_none() {
        return fail(Error::Validation(
            "http_push integration requires deliveryUrl".into(),
        ));
    }
    let config = IntegrationConfig {
        id: Uuid::new_v4(),
        project_id: pid,
        channel: body.channel,
        kind: body.kind,
        delivery_url: body.delivery_url,
    };
    state.channels.upsert(config.clone());
    ok(config)
}

pub async fn list(State(state): State<AppState>, Path(pid): Path<String>) -> Response {
    ok(state.channels.list(&pid))
}

pub async fn remove(
    State(state): State<AppState>,
    Path((pid, channel)): Path<(String, String)>,
) -> Response {
    if state.channels.remove(&pid, &channel) {
        ok(serde_json::json!({"deleted": channel}))
    } else {
        fail(Error::NotFound(format!(
            "no integration for project '{pid}' channel '{channel}'"
        )))
    }
}

/// `POST /inbound/:pid/:channel` — raw channel payload fan-in. The
/// resolved adapter normalizes the payload, then the inbound processor
/// runs the turn and dispatches the reply.
pub async fn inbound(
    State(state): State<AppState>,
    Path((pid, channel)): Path<(String, String)>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let adapter = match state.channels.resolve(&pid, &channel) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    let message = match adapter.parse_inbound(&pid, &payload) {
        Ok(m) => m,
        Err(e) => return fail(e),
    };
    respond(inbound::process(&state, message).await)
}
