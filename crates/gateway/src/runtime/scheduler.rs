//! Scheduled-task dispatcher.
//!
//! A single tick loop queries due tasks (ascending `next_run_at`), claims
//! each with a CAS on `(id, last_run_at)`, and spawns an executor. Tasks
//! for the same project run serially; tasks across projects run
//! concurrently up to the worker pool. Each run gets its own session, a
//! timeout-wrapped cancel token, a per-run budget, and retry with
//! exponential backoff on transient failure.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use nexus_domain::cancel::CancelToken;
use nexus_domain::error::Error;
use nexus_domain::session::Session;
use nexus_domain::task::{ScheduledTask, ScheduledTaskRun, TaskRunStatus};

use super::cron;
use super::runner::TurnOutcome;
use crate::state::AppState;
use crate::runtime::{execute_turn, TurnJob};

/// Base backoff between retry attempts; doubled per attempt.
const RETRY_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Spawn the dispatcher loop.
pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    let tick_seconds = state.config.scheduler.tick_seconds.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tick(&state).await;
        }
    })
}

/// One dispatcher pass: claim every due task and spawn its executor.
pub async fn tick(state: &AppState) {
    let now = Utc::now();
    let due = state.tasks.due_tasks(now).await;
    if due.is_empty() {
        return;
    }
    tracing::debug!(due = due.len(), "scheduler tick");

    for task in due {
        // The CAS on (id, last_run_at) prevents double-dispatch when a
        // slow executor overlaps the next tick; claiming also advances
        // next_run_at past the consumed window.
        let next = cron::cron_next(&task.cron_expression, &now);
        if !state.tasks.claim(task.id, task.last_run_at, now, next).await {
            continue;
        }
        let state = state.clone();
        tokio::spawn(async move {
            execute_task(state, task).await;
        });
    }
}

/// Run one claimed task to completion, including retries, then update
/// the run record and the task's schedule.
async fn execute_task(state: AppState, task: ScheduledTask) {
    let _worker = state
        .scheduler_pool
        .clone()
        .acquire_owned()
        .await
        .expect("scheduler pool semaphore is never closed");
    // Per-project serialization: one run at a time per tenant.
    let _project_lock = state
        .project_locks
        .acquire(&format!("project:{}", task.project_id))
        .await;

    let run = state.task_runs.insert(ScheduledTaskRun::new(task.id)).await;
    tracing::info!(task_id = %task.id, run_id = %run.id, name = %task.name, "task run starting");

    let mut attempt: u32 = 0;
    let outcome = loop {
        let started = Utc::now();
        let _ = state
            .task_runs
            .update(run.id, |r| {
                r.status = TaskRunStatus::Running;
                r.started_at = Some(started);
                r.retry_count = attempt;
            })
            .await;

        match run_task_once(&state, &task).await {
            Ok(turn) => break RunEnd::Completed(turn),
            Err(RunFailure::Timeout) => break RunEnd::Timeout,
            Err(RunFailure::Budget(message)) => break RunEnd::BudgetExceeded(message),
            Err(RunFailure::Other(e)) if attempt < task.max_retries => {
                let backoff = RETRY_BACKOFF_BASE * 2u32.saturating_pow(attempt);
                tracing::warn!(
                    task_id = %task.id,
                    attempt = attempt + 1,
                    max_retries = task.max_retries,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "task run failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(RunFailure::Other(e)) => break RunEnd::Failed(e.to_string()),
        }
    };

    finalize_run(&state, &task, run.id, outcome).await;
}

enum RunEnd {
    Completed(TurnOutcome),
    Timeout,
    BudgetExceeded(String),
    Failed(String),
}

enum RunFailure {
    Timeout,
    Budget(String),
    Other(Error),
}

/// One attempt: synthesized session, timeout-wrapped turn.
async fn run_task_once(state: &AppState, task: &ScheduledTask) -> Result<TurnOutcome, RunFailure> {
    let project = state
        .projects
        .get(&task.project_id)
        .await
        .map_err(RunFailure::Other)?;

    let session = state
        .sessions
        .insert(Session::new(
            &task.project_id,
            serde_json::json!({
                "source": "schedule",
                "taskId": task.id.to_string(),
            }),
        ))
        .await;

    let cancel = CancelToken::new();
    let effective_timeout = effective_timeout_ms(task);

    let job = TurnJob {
        project,
        session_id: session.id,
        raw_message: task.task_payload.message.clone(),
        per_run_budget_usd: task.budget_per_run_usd,
        max_turns_override: task.max_turns,
        cancel: Some(cancel.clone()),
        events: None,
    };

    let result = tokio::time::timeout(
        Duration::from_millis(effective_timeout),
        execute_turn(state, job),
    )
    .await;

    match result {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(Error::BudgetExceeded(message))) => Err(RunFailure::Budget(message)),
        Ok(Err(e)) => Err(RunFailure::Other(e)),
        Err(_elapsed) => {
            // Abort the in-flight turn; the runner observes the token at
            // its next suspension point and fails its trace.
            cancel.cancel();
            Err(RunFailure::Timeout)
        }
    }
}

fn effective_timeout_ms(task: &ScheduledTask) -> u64 {
    let mut timeout = task.timeout_ms;
    if let Some(minutes) = task.max_duration_minutes {
        timeout = timeout.min(minutes as u64 * 60_000);
    }
    timeout.max(1)
}

/// Record the run outcome and recompute the task's next firing.
async fn finalize_run(state: &AppState, task: &ScheduledTask, run_id: Uuid, outcome: RunEnd) {
    let completed = Utc::now();
    let (status, success, error_message, turn) = match outcome {
        RunEnd::Completed(turn) => (TaskRunStatus::Completed, true, None, Some(turn)),
        RunEnd::Timeout => (
            TaskRunStatus::Timeout,
            false,
            Some(format!("run exceeded {}ms", effective_timeout_ms(task))),
            None,
        ),
        RunEnd::BudgetExceeded(message) => {
            (TaskRunStatus::BudgetExceeded, false, Some(message), None)
        }
        RunEnd::Failed(message) => (TaskRunStatus::Failed, false, Some(message), None),
    };

    let _ = state
        .task_runs
        .update(run_id, |r| {
            r.status = status;
            r.completed_at = Some(completed);
            r.duration_ms = r
                .started_at
                .map(|s| (completed - s).num_milliseconds().max(0) as u64);
            r.error_message = error_message.clone();
            if let Some(turn) = &turn {
                r.tokens_used = Some(turn.trace.total_tokens_used);
                r.cost_usd = Some(turn.trace.total_cost_usd);
                r.trace_id = Some(turn.trace.id);
                r.result = Some(truncate(&turn.response_text, 2000));
            }
        })
        .await;

    // next_run_at is recomputed from the cron regardless of the outcome:
    // a failed or timed-out run never stalls the schedule.
    let next = cron::cron_next(&task.cron_expression, &Utc::now());
    match state
        .tasks
        .record_run_outcome(task.id, next, success, error_message)
        .await
    {
        Ok(updated) => {
            tracing::info!(
                task_id = %task.id,
                run_id = %run_id,
                status = ?status,
                next_run_at = ?updated.next_run_at,
                task_status = ?updated.status,
                "task run finished"
            );
        }
        Err(e) => {
            tracing::warn!(task_id = %task.id, error = %e, "failed to record task outcome");
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
