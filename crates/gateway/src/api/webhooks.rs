//! Webhook management and the public trigger endpoint.
//!
//! `POST /trigger/:id` accepts the raw body (the exact bytes the HMAC is
//! computed over), validates synchronously, then either processes inline
//! or enqueues for the async queue when `async=true` is requested.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use nexus_domain::error::Error;
use nexus_domain::webhook::{Webhook, WebhookEvent, WebhookStatus};

use crate::state::AppState;
use crate::webhook;

use super::{fail, ok, respond};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhook {
    pub project_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub name: String,
    pub trigger_prompt: String,
    #[serde(default)]
    pub secret_env_var: Option<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub paused: bool,
}

pub async fn create(State(state): State<AppState>, Json(body): Json<CreateWebhook>) -> Response {
    if let Err(e) = state.projects.get(&body.project_id).await {
        return fail(e);
    }
    if body.trigger_prompt.trim().is_empty() {
        return fail(Error::Validation("triggerPrompt must not be empty".into()));
    }
    let now = Utc::now();
    let webhook = Webhook {
        id: Uuid::new_v4(),
        project_id: body.project_id,
        agent_id: body.agent_id,
        name: body.name,
        trigger_prompt: body.trigger_prompt,
        secret_env_var: body.secret_env_var,
        allowed_ips: body.allowed_ips,
        status: if body.paused {
            WebhookStatus::Paused
        } else {
            WebhookStatus::Active
        },
        created_at: now,
        updated_at: now,
    };
    ok(state.webhooks.insert(webhook).await)
}

pub async fn list(State(state): State<AppState>, Path(pid): Path<String>) -> Response {
    ok(state.webhooks.list_by_project(&pid).await)
}

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    /// Queue instead of processing inline.
    #[serde(default)]
    pub r#async: bool,
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

pub async fn trigger(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
    Query(query): Query<TriggerQuery>,
    connect_info: Option<ConnectInfo<std::net::SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw_body = String::from_utf8_lossy(&body).to_string();
    let payload: serde_json::Value =
        serde_json::from_str(&raw_body).unwrap_or(serde_json::Value::Null);

    let event = WebhookEvent {
        webhook_id,
        payload,
        headers: header_map(&headers),
        raw_body,
        source_ip: connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()),
        received_at: Utc::now(),
    };

    if query.r#async {
        // Validate before queueing so callers still get 4xx immediately.
        let webhook = match state.webhooks.get(webhook_id).await {
            Ok(w) => w,
            Err(e) => return fail(e),
        };
        if let Err(e) = webhook::validate(&webhook, &event) {
            return fail(e);
        }
        return match state.webhook_queue.enqueue(event).await {
            Ok(job_id) => ok(serde_json::json!({ "queued": true, "jobId": job_id })),
            Err(msg) => fail(Error::Unavailable(msg.into())),
        };
    }

    respond(webhook::process(&state, event).await)
}

#[derive(Debug, Deserialize)]
pub struct TestBody {
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Exercise a webhook without signature/IP validation — template
/// expansion and the agent run are real.
pub async fn test(
    State(state): State<AppState>,
    Path((pid, id)): Path<(String, Uuid)>,
    Json(body): Json<TestBody>,
) -> Response {
    let webhook = match state.webhooks.get(id).await {
        Ok(w) => w,
        Err(e) => return fail(e),
    };
    if webhook.project_id != pid {
        return fail(Error::Forbidden(format!(
            "webhook {id} does not belong to project '{pid}'"
        )));
    }

    let raw_body = body.payload.to_string();
    let event = WebhookEvent {
        webhook_id: id,
        payload: body.payload,
        headers: HashMap::new(),
        raw_body,
        source_ip: None,
        received_at: Utc::now(),
    };

    respond(webhook::run(&state, &webhook, event).await)
}
