//! Project CRUD and cost status.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use nexus_domain::error::Error;
use nexus_domain::project::{AgentConfig, Environment, Project};

use crate::state::AppState;

use super::{fail, ok, respond};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    pub id: Option<String>,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub tags: Vec<String>,
    pub agent_config: AgentConfig,
}

pub async fn create(State(state): State<AppState>, Json(body): Json<CreateProject>) -> Response {
    if body.name.trim().is_empty() {
        return fail(Error::Validation("project name must not be empty".into()));
    }
    let now = Utc::now();
    let project = Project {
        id: body
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name: body.name,
        owner: body.owner,
        environment: body.environment,
        tags: body.tags,
        agent_config: body.agent_config,
        created_at: now,
        updated_at: now,
    };
    respond(state.projects.insert(project).await)
}

pub async fn list(State(state): State<AppState>) -> Response {
    ok(state.projects.list().await)
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.projects.get(&id).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProject {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub agent_config: Option<AgentConfig>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProject>,
) -> Response {
    let result = state
        .projects
        .update(&id, |p| {
            if let Some(name) = body.name {
                p.name = name;
            }
            if let Some(tags) = body.tags {
                p.tags = tags;
            }
            if let Some(agent_config) = body.agent_config {
                p.agent_config = agent_config;
            }
        })
        .await;
    // Cached agent config and provider adapters may now be stale.
    state.agent_cache.invalidate(&id);
    if let Ok(project) = &result {
        state.providers.invalidate(&project.agent_config.provider);
    }
    respond(result)
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    // Projects are never deleted while sessions exist.
    if state.sessions.project_has_sessions(&id).await {
        return fail(Error::Validation(format!(
            "project '{id}' has sessions and cannot be deleted"
        )));
    }
    state.agent_cache.invalidate(&id);
    respond(state.projects.delete(&id).await.map(|_| serde_json::json!({"deleted": id})))
}

pub async fn cost_status(State(state): State<AppState>, Path(pid): Path<String>) -> Response {
    match state.projects.get(&pid).await {
        Ok(project) => ok(state.cost.status(&pid, &project.agent_config.cost).await),
        Err(e) => fail(e),
    }
}
