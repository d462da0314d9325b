//! Scheduled tasks and their per-firing run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Proposed,
    Active,
    Paused,
    Rejected,
    Completed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrigin {
    Static,
    AgentProposed,
}

/// What a task firing feeds to the agent. Extra fields are carried opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub message: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_task_max_retries() -> u32 {
    2
}
fn default_task_timeout_ms() -> u64 {
    120_000
}

/// A cron-scheduled unit of agent work.
///
/// `next_run_at` always reflects the next UTC firing of the cron given
/// `last_run_at`; it is recomputed whenever the task becomes active and
/// after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: Uuid,
    pub project_id: String,
    pub name: String,
    /// 5-field cron: "minute hour dom month dow", evaluated in UTC.
    pub cron_expression: String,
    pub task_payload: TaskPayload,
    pub origin: TaskOrigin,
    pub status: TaskStatus,
    #[serde(default = "default_task_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_task_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub budget_per_run_usd: Option<f64>,
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub max_runs: Option<u32>,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // ── Error tracking (informational; firing semantics unaffected) ──
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_error_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    BudgetExceeded,
}

/// Record of one task firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTaskRun {
    pub id: Uuid,
    pub task_id: Uuid,
    pub status: TaskRunStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub trace_id: Option<Uuid>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl ScheduledTaskRun {
    pub fn new(task_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            status: TaskRunStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            tokens_used: None,
            cost_usd: None,
            trace_id: None,
            result: None,
            error_message: None,
            retry_count: 0,
        }
    }
}
