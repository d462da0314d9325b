//! HTTP API — JSON over HTTP, every response shaped
//! `{success, data}` or `{success:false, error:{code,message,statusCode}}`.

pub mod approvals;
pub mod chat;
pub mod health;
pub mod integrations;
pub mod layers;
pub mod projects;
pub mod secrets;
pub mod sessions;
pub mod tasks;
pub mod traces;
pub mod webhooks;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use nexus_domain::error::Error;

use crate::state::AppState;

/// Build the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Chat
        .route("/chat", post(chat::chat))
        .route("/chat/stream", post(chat::chat_stream))
        .route("/sessions/:id/cancel", post(chat::cancel))
        // Projects
        .route("/projects", get(projects::list).post(projects::create))
        .route(
            "/projects/:pid",
            get(projects::get).put(projects::update).delete(projects::remove),
        )
        // Prompt layers
        .route(
            "/projects/:pid/prompt-layers",
            get(layers::list).post(layers::create),
        )
        .route("/projects/:pid/prompt-layers/active", get(layers::active))
        .route("/prompt-layers/:id/activate", post(layers::activate))
        // Sessions
        .route("/projects/:pid/sessions", get(sessions::list))
        .route("/sessions/:id/messages", get(sessions::messages))
        // Traces
        .route("/traces/:id", get(traces::get))
        // Approvals
        .route("/approvals", get(approvals::list))
        .route("/approvals/:id", get(approvals::get))
        .route("/approvals/:id/resolve", post(approvals::resolve))
        // Scheduled tasks
        .route(
            "/projects/:pid/scheduled-tasks",
            get(tasks::list).post(tasks::create),
        )
        .route("/scheduled-tasks/:id", get(tasks::get).delete(tasks::remove))
        .route("/scheduled-tasks/:id/approve", post(tasks::approve))
        .route("/scheduled-tasks/:id/pause", post(tasks::pause))
        .route("/scheduled-tasks/:id/runs", get(tasks::runs))
        // Webhooks
        .route("/webhooks", post(webhooks::create))
        .route("/trigger/:webhook_id", post(webhooks::trigger))
        .route("/projects/:pid/webhooks", get(webhooks::list))
        .route("/projects/:pid/webhooks/:id/test", post(webhooks::test))
        // Inbound channel fan-in
        .route("/inbound/:pid/:channel", post(integrations::inbound))
        // Integrations
        .route(
            "/projects/:pid/integrations",
            get(integrations::list).post(integrations::upsert),
        )
        .route(
            "/projects/:pid/integrations/:channel",
            delete(integrations::remove),
        )
        // Secrets
        .route(
            "/projects/:pid/secrets",
            get(secrets::list).post(secrets::set),
        )
        .route(
            "/projects/:pid/secrets/:key",
            get(secrets::get).delete(secrets::remove),
        )
        // Cost status
        .route("/projects/:pid/cost", get(projects::cost_status))
        // Health
        .route("/health", get(health::health))
        .with_state(state)
}

/// Wrap a payload in the success envelope.
pub(crate) fn ok<T: serde::Serialize>(data: T) -> Response {
    Json(serde_json::json!({ "success": true, "data": data })).into_response()
}

/// Map a domain error to its HTTP status and error envelope.
pub(crate) fn fail(err: Error) -> Response {
    let status_code = err.status_code();
    let status =
        StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": {
                "code": err.code(),
                "message": err.to_string(),
                "statusCode": status_code,
            }
        })),
    )
        .into_response()
}

/// `Result` → envelope shortcut used by most handlers.
pub(crate) fn respond<T: serde::Serialize>(result: Result<T, Error>) -> Response {
    match result {
        Ok(data) => ok(data),
        Err(err) => fail(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_maps_status_codes() {
        let resp = fail(Error::NotFound("x".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = fail(Error::BudgetExceeded("x".into()));
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let resp = fail(Error::Unavailable("x".into()));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
