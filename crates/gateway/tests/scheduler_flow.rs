//! Scheduler dispatch scenarios: one run per due task, timeout handling,
//! schedule recomputation.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::*;
use nexus_domain::task::{
    ScheduledTask, TaskOrigin, TaskPayload, TaskRunStatus, TaskStatus,
};
use nexus_gateway::runtime::scheduler;
use uuid::Uuid;

fn due_task(project: &str, timeout_ms: u64) -> ScheduledTask {
    let now = Utc::now();
    ScheduledTask {
        id: Uuid::new_v4(),
        project_id: project.into(),
        name: "digest".into(),
        cron_expression: "* * * * *".into(),
        task_payload: TaskPayload {
            message: "compile the digest".into(),
            extra: Default::default(),
        },
        origin: TaskOrigin::Static,
        status: TaskStatus::Active,
        max_retries: 0,
        timeout_ms,
        budget_per_run_usd: None,
        max_duration_minutes: None,
        max_turns: None,
        max_runs: None,
        run_count: 0,
        last_run_at: None,
        next_run_at: Some(now - chrono::Duration::seconds(5)),
        expires_at: None,
        created_at: now,
        updated_at: now,
        consecutive_failures: 0,
        last_error: None,
        last_error_at: None,
    }
}

async fn wait_for_terminal_run(
    state: &nexus_gateway::state::AppState,
    task_id: Uuid,
) -> nexus_domain::task::ScheduledTaskRun {
    for _ in 0..200 {
        let runs = state.task_runs.list_by_task(task_id).await;
        if let Some(run) = runs.iter().find(|r| {
            !matches!(r.status, TaskRunStatus::Pending | TaskRunStatus::Running)
        }) {
            return run.clone();
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("task run never reached a terminal status");
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_run_records_usage_and_reschedules() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    state.projects.insert(test_project("P1", vec![])).await.unwrap();
    seed_layers(&state, "P1").await;

    let provider = ScriptedProvider::new(vec![text_reply("digest compiled", 80, 20)]);
    state.providers.register_custom(&test_provider_spec(), provider);

    let task = state.tasks.insert(due_task("P1", 30_000)).await;
    let tick_start = Utc::now();
    scheduler::tick(&state).await;

    let run = wait_for_terminal_run(&state, task.id).await;
    assert_eq!(run.status, TaskRunStatus::Completed);
    assert_eq!(run.tokens_used, Some(100));
    assert!(run.trace_id.is_some());
    assert_eq!(run.result.as_deref(), Some("digest compiled"));

    let updated = state.tasks.get(task.id).await.unwrap();
    assert_eq!(updated.run_count, 1);
    assert_eq!(updated.status, TaskStatus::Active);
    assert!(updated.next_run_at.unwrap() > tick_start);
    // The session was synthesized with schedule provenance.
    let sessions = state.sessions.list_by_project("P1").await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(
        sessions[0].metadata.get("source").and_then(|v| v.as_str()),
        Some("schedule")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_run_times_out_and_task_stays_active() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    state.projects.insert(test_project("P1", vec![])).await.unwrap();
    seed_layers(&state, "P1").await;

    // Provider stalls for 10s; the task allows 100ms.
    let provider = ScriptedProvider::slow(Duration::from_secs(10));
    state.providers.register_custom(&test_provider_spec(), provider);

    let task = state.tasks.insert(due_task("P1", 100)).await;
    scheduler::tick(&state).await;

    let run = wait_for_terminal_run(&state, task.id).await;
    assert_eq!(run.status, TaskRunStatus::Timeout);
    assert!(run.error_message.as_deref().unwrap().contains("100ms"));

    let updated = state.tasks.get(task.id).await.unwrap();
    assert_eq!(updated.status, TaskStatus::Active);
    assert!(updated.next_run_at.is_some());
    assert_eq!(updated.consecutive_failures, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn each_due_task_produces_exactly_one_run_per_tick() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    state.projects.insert(test_project("P1", vec![])).await.unwrap();
    seed_layers(&state, "P1").await;

    let provider = ScriptedProvider::new(vec![
        text_reply("one", 10, 2),
        text_reply("two", 10, 2),
    ]);
    state.providers.register_custom(&test_provider_spec(), provider);

    let a = state.tasks.insert(due_task("P1", 30_000)).await;
    let b = state.tasks.insert(due_task("P1", 30_000)).await;

    // Two ticks in quick succession: the CAS claim must not re-dispatch
    // a task whose next_run_at has already been consumed.
    scheduler::tick(&state).await;
    scheduler::tick(&state).await;

    wait_for_terminal_run(&state, a.id).await;
    wait_for_terminal_run(&state, b.id).await;

    assert_eq!(state.task_runs.list_by_task(a.id).await.len(), 1);
    assert_eq!(state.task_runs.list_by_task(b.id).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn max_runs_completes_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    state.projects.insert(test_project("P1", vec![])).await.unwrap();
    seed_layers(&state, "P1").await;

    let provider = ScriptedProvider::new(vec![text_reply("done", 10, 2)]);
    state.providers.register_custom(&test_provider_spec(), provider);

    let mut task = due_task("P1", 30_000);
    task.max_runs = Some(1);
    let task = state.tasks.insert(task).await;

    scheduler::tick(&state).await;
    wait_for_terminal_run(&state, task.id).await;

    let updated = state.tasks.get(task.id).await.unwrap();
    assert_eq!(updated.status, TaskStatus::Completed);
    assert_eq!(updated.run_count, 1);
}
