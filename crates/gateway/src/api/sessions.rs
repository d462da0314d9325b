//! Session browsing.

use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::state::AppState;

use super::{fail, ok};

pub async fn list(State(state): State<AppState>, Path(pid): Path<String>) -> Response {
    ok(state.sessions.list_by_project(&pid).await)
}

pub async fn messages(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.sessions.get(id).await {
        Ok(_) => ok(state.messages.list_by_session(id).await),
        Err(e) => fail(e),
    }
}
