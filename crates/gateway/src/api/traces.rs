//! Trace retrieval.

use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::state::AppState;

use super::respond;

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    respond(state.traces.get(id).await)
}
