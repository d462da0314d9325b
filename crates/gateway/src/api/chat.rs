//! Chat endpoints — the primary interface for running agent turns.
//!
//! - `POST /chat`        — non-streaming: returns the full response
//! - `POST /chat/stream` — SSE: forwards the provider's ChatEvent stream

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_core::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use nexus_domain::error::Error;
use nexus_domain::session::Session;

use crate::runtime::{execute_turn, TurnJob};
use crate::state::AppState;

use super::{fail, ok};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub project_id: String,
    /// Continue an existing session; absent means a fresh one.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub message: String,
}

async fn resolve_session(
    state: &AppState,
    project_id: &str,
    session_id: Option<Uuid>,
) -> Result<Session, Error> {
    match session_id {
        Some(id) => {
            let session = state.sessions.get(id).await?;
            if session.project_id != project_id {
                return Err(Error::Forbidden(format!(
                    "session {id} does not belong to project '{project_id}'"
                )));
            }
            Ok(session)
        }
        None => Ok(state
            .sessions
            .insert(Session::new(project_id, serde_json::json!({"channel": "chat"})))
            .await),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /chat (non-streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> Response {
    let project = match state.projects.get(&body.project_id).await {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let session = match resolve_session(&state, &body.project_id, body.session_id).await {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let outcome = execute_turn(
        &state,
        TurnJob {
            project,
            session_id: session.id,
            raw_message: body.message,
            per_run_budget_usd: None,
            max_turns_override: None,
            cancel: None,
            events: None,
        },
    )
    .await;

    match outcome {
        Ok(outcome) => ok(serde_json::json!({
            "sessionId": session.id,
            "traceId": outcome.trace.id,
            "response": outcome.response_text,
            "toolCalls": outcome.executed_tool_calls,
            "truncated": outcome.truncated,
            "turnCount": outcome.trace.turn_count,
        })),
        Err(e) => fail(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /chat/stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Response {
    let project = match state.projects.get(&body.project_id).await {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let session = match resolve_session(&state, &body.project_id, body.session_id).await {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let (tx, mut rx) = mpsc::channel(64);
    let session_id = session.id;

    let turn_state = state.clone();
    tokio::spawn(async move {
        let result = execute_turn(
            &turn_state,
            TurnJob {
                project,
                session_id,
                raw_message: body.message,
                per_run_budget_usd: None,
                max_turns_override: None,
                cancel: None,
                events: Some(tx.clone()),
            },
        )
        .await;
        // A failed turn surfaces one terminal error event before the
        // stream closes; partial output is not resent.
        if let Err(e) = result {
            let _ = tx
                .send(nexus_domain::stream::ChatEvent::Error {
                    cause: format!("{}: {e}", e.code()),
                })
                .await;
        }
    });

    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, std::convert::Infallible>> + Send>> =
        Box::pin(async_stream::stream! {
            yield Ok(Event::default()
                .event("session")
                .data(session_id.to_string()));
            while let Some(chat_event) = rx.recv().await {
                let payload = serde_json::to_string(&chat_event).unwrap_or_default();
                yield Ok(Event::default().data(payload));
            }
        });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /sessions/:id/cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    if state.cancel_map.cancel(id) {
        ok(serde_json::json!({ "canceled": true }))
    } else {
        fail(Error::NotFound(format!("no running turn for session {id}")))
    }
}
