//! TaskStore & TaskRunStore — cron-scheduled work and its run history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use nexus_domain::error::{Error, Result};
use nexus_domain::task::{ScheduledTask, ScheduledTaskRun, TaskStatus};

use crate::persist;

pub struct TaskStore {
    inner: RwLock<HashMap<Uuid, ScheduledTask>>,
    persist_path: PathBuf,
}

impl TaskStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("scheduled_tasks.json");
        let items: Vec<ScheduledTask> = persist::load_items(&persist_path);
        let mut map = HashMap::new();
        for t in items {
            map.insert(t.id, t);
        }
        if !map.is_empty() {
            tracing::info!(count = map.len(), "loaded scheduled tasks from disk");
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items: Vec<ScheduledTask> = self.inner.read().await.values().cloned().collect();
        persist::save_items(&self.persist_path, &items).await;
    }

    pub async fn insert(&self, task: ScheduledTask) -> ScheduledTask {
        self.inner.write().await.insert(task.id, task.clone());
        self.persist().await;
        task
    }

    pub async fn get(&self, id: Uuid) -> Result<ScheduledTask> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("scheduled task {id}")))
    }

    pub async fn list_by_project(&self, project_id: &str) -> Vec<ScheduledTask> {
        let mut items: Vec<ScheduledTask> = self
            .inner
            .read()
            .await
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    pub async fn update(&self, id: Uuid, f: impl FnOnce(&mut ScheduledTask)) -> Result<ScheduledTask> {
        let updated = {
            let mut map = self.inner.write().await;
            let task = map
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("scheduled task {id}")))?;
            f(task);
            task.updated_at = Utc::now();
            task.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        let removed = self.inner.write().await.remove(&id).is_some();
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Active tasks due at or before `now`, ordered by `next_run_at` ASC.
    pub async fn due_tasks(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut due: Vec<ScheduledTask> = self
            .inner
            .read()
            .await
            .values()
            .filter(|t| t.status == TaskStatus::Active)
            .filter(|t| t.next_run_at.map_or(false, |next| next <= now))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_run_at);
        due
    }

    /// Claim a due task with a CAS on `(id, last_run_at)`: succeeds only if
    /// `last_run_at` still matches what the dispatcher read, preventing
    /// double-dispatch. On success `last_run_at` moves to `now` and
    /// `next_run_at` advances to the caller-computed next firing so later
    /// ticks never re-dispatch a task whose run is still in flight.
    pub async fn claim(
        &self,
        id: Uuid,
        expected_last_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> bool {
        let claimed = {
            let mut map = self.inner.write().await;
            match map.get_mut(&id) {
                Some(task)
                    if task.status == TaskStatus::Active
                        && task.last_run_at == expected_last_run_at =>
                {
                    task.last_run_at = Some(now);
                    task.next_run_at = next_run_at;
                    task.updated_at = now;
                    true
                }
                _ => false,
            }
        };
        if claimed {
            self.persist().await;
        }
        claimed
    }

    /// Post-run bookkeeping: bump run count, recompute `next_run_at`
    /// (computed by the caller from the cron), record the error state, and
    /// apply terminal transitions (`max_runs` → completed,
    /// `expires_at` passed → expired).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_run_outcome(
        &self,
        id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
        success: bool,
        error: Option<String>,
    ) -> Result<ScheduledTask> {
        self.update(id, |task| {
            task.run_count += 1;
            task.next_run_at = next_run_at;
            if success {
                task.consecutive_failures = 0;
                task.last_error = None;
                task.last_error_at = None;
            } else {
                task.consecutive_failures += 1;
                task.last_error = error;
                task.last_error_at = Some(Utc::now());
            }
            if let Some(max_runs) = task.max_runs {
                if task.run_count >= max_runs {
                    task.status = TaskStatus::Completed;
                }
            }
            if let Some(expires) = task.expires_at {
                if expires <= Utc::now() && task.status == TaskStatus::Active {
                    task.status = TaskStatus::Expired;
                }
            }
        })
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TaskRunStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TaskRunStore {
    inner: RwLock<HashMap<Uuid, ScheduledTaskRun>>,
    persist_path: PathBuf,
}

impl TaskRunStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("task_runs.json");
        let items: Vec<ScheduledTaskRun> = persist::load_items(&persist_path);
        let mut map = HashMap::new();
        for r in items {
            map.insert(r.id, r);
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items: Vec<ScheduledTaskRun> = self.inner.read().await.values().cloned().collect();
        persist::save_items(&self.persist_path, &items).await;
    }

    pub async fn insert(&self, run: ScheduledTaskRun) -> ScheduledTaskRun {
        self.inner.write().await.insert(run.id, run.clone());
        self.persist().await;
        run
    }

    pub async fn get(&self, id: Uuid) -> Result<ScheduledTaskRun> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task run {id}")))
    }

    pub async fn update(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ScheduledTaskRun),
    ) -> Result<ScheduledTaskRun> {
        let updated = {
            let mut map = self.inner.write().await;
            let run = map
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("task run {id}")))?;
            f(run);
            run.clone()
        };
        self.persist().await;
        Ok(updated)
    }

    pub async fn list_by_task(&self, task_id: Uuid) -> Vec<ScheduledTaskRun> {
        let mut items: Vec<ScheduledTaskRun> = self
            .inner
            .read()
            .await
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        items.sort_by_key(|r| r.started_at);
        items
    }
}
