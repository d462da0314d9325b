//! UsageStore — the per-LLM-call cost ledger.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::RwLock;

use nexus_domain::usage::UsageRecord;

use crate::persist;

/// Aggregates for the cost guard's budget math.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub daily_usd: f64,
    pub monthly_usd: f64,
    pub daily_tokens: u64,
    pub monthly_tokens: u64,
}

pub struct UsageStore {
    inner: RwLock<Vec<UsageRecord>>,
    persist_path: PathBuf,
}

impl UsageStore {
    pub fn new(state_dir: &Path) -> Self {
        let persist_path = state_dir.join("usage.json");
        let items: Vec<UsageRecord> = persist::load_items(&persist_path);
        Self {
            inner: RwLock::new(items),
            persist_path,
        }
    }

    async fn persist(&self) {
        let items = self.inner.read().await.clone();
        persist::save_items(&self.persist_path, &items).await;
    }

    pub async fn append(&self, record: UsageRecord) {
        self.inner.write().await.push(record);
        self.persist().await;
    }

    /// Daily and monthly totals for a project, evaluated at `now` (UTC
    /// day/month boundaries).
    pub async fn totals(&self, project_id: &str, now: DateTime<Utc>) -> UsageTotals {
        let today = now.date_naive();
        let (year, month) = (now.year(), now.month());

        let mut totals = UsageTotals::default();
        for r in self.inner.read().await.iter() {
            if r.project_id != project_id {
                continue;
            }
            if r.timestamp.year() == year && r.timestamp.month() == month {
                totals.monthly_usd += r.cost_usd;
                totals.monthly_tokens += r.total_tokens();
                if r.timestamp.date_naive() == today {
                    totals.daily_usd += r.cost_usd;
                    totals.daily_tokens += r.total_tokens();
                }
            }
        }
        totals
    }

    pub async fn list_by_trace(&self, trace_id: uuid::Uuid) -> Vec<UsageRecord> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|r| r.trace_id == trace_id)
            .cloned()
            .collect()
    }
}
