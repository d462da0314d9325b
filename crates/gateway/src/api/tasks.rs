//! Scheduled-task CRUD, approval, and pause.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use nexus_domain::error::Error;
use nexus_domain::task::{ScheduledTask, TaskOrigin, TaskPayload, TaskStatus};

use crate::runtime::cron;
use crate::state::AppState;

use super::{fail, ok, respond};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    pub name: String,
    pub cron_expression: String,
    pub task_payload: TaskPayload,
    #[serde(default = "default_origin")]
    pub origin: TaskOrigin,
    /// Agent-proposed tasks start `proposed`; static ones start `active`.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub budget_per_run_usd: Option<f64>,
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub max_runs: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

fn default_origin() -> TaskOrigin {
    TaskOrigin::Static
}

pub async fn create(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Json(body): Json<CreateTask>,
) -> Response {
    if let Err(e) = state.projects.get(&pid).await {
        return fail(e);
    }
    if !cron::is_valid(&body.cron_expression) {
        return fail(Error::Validation(format!(
            "'{}' is not a 5-field cron expression",
            body.cron_expression
        )));
    }
    if body.task_payload.message.trim().is_empty() {
        return fail(Error::Validation("taskPayload.message must not be empty".into()));
    }

    let status = body.status.unwrap_or(match body.origin {
        TaskOrigin::Static => TaskStatus::Active,
        TaskOrigin::AgentProposed => TaskStatus::Proposed,
    });
    let now = Utc::now();
    let next_run_at = (status == TaskStatus::Active)
        .then(|| cron::cron_next(&body.cron_expression, &now))
        .flatten();

    let task = ScheduledTask {
        id: Uuid::new_v4(),
        project_id: pid,
        name: body.name,
        cron_expression: body.cron_expression,
        task_payload: body.task_payload,
        origin: body.origin,
        status,
        max_retries: body.max_retries.unwrap_or(2),
        timeout_ms: body.timeout_ms.unwrap_or(120_000),
        budget_per_run_usd: body.budget_per_run_usd,
        max_duration_minutes: body.max_duration_minutes,
        max_turns: body.max_turns,
        max_runs: body.max_runs,
        run_count: 0,
        last_run_at: None,
        next_run_at,
        expires_at: body.expires_at,
        created_at: now,
        updated_at: now,
        consecutive_failures: 0,
        last_error: None,
        last_error_at: None,
    };
    ok(state.tasks.insert(task).await)
}

pub async fn list(State(state): State<AppState>, Path(pid): Path<String>) -> Response {
    ok(state.tasks.list_by_project(&pid).await)
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    respond(state.tasks.get(id).await)
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    if state.tasks.delete(id).await {
        ok(serde_json::json!({"deleted": id}))
    } else {
        fail(Error::NotFound(format!("scheduled task {id}")))
    }
}

/// Approve a proposed (or resume a paused) task. Recomputes
/// `next_run_at` from the cron on activation.
pub async fn approve(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let result = state
        .tasks
        .update(id, |task| {
            task.status = TaskStatus::Active;
            task.next_run_at = cron::cron_next(&task.cron_expression, &Utc::now());
        })
        .await;
    respond(result)
}

pub async fn pause(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    respond(
        state
            .tasks
            .update(id, |task| {
                task.status = TaskStatus::Paused;
            })
            .await,
    )
}

pub async fn runs(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.tasks.get(id).await {
        Ok(_) => ok(state.task_runs.list_by_task(id).await),
        Err(e) => fail(e),
    }
}
