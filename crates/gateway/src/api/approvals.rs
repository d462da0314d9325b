//! Approval workflow endpoints.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use nexus_domain::error::Error;

use crate::state::AppState;

use super::{fail, ok, respond};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub project_id: String,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    ok(state.approvals.list_pending(&query.project_id).await)
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    respond(state.approvals.get(id).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBody {
    /// "approved" or "denied".
    pub decision: String,
    pub resolved_by: String,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveBody>,
) -> Response {
    let approve = match body.decision.as_str() {
        "approved" => true,
        "denied" => false,
        other => {
            return fail(Error::Validation(format!(
                "decision must be 'approved' or 'denied', got '{other}'"
            )))
        }
    };
    respond(
        state
            .approvals
            .resolve(id, approve, body.resolved_by, body.note)
            .await,
    )
}
