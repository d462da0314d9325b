//! Cost guard — budget prechecks, the usage ledger, rate limits, and
//! one-shot budget alerts.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Datelike, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use nexus_domain::error::{Error, Result};
use nexus_domain::project::CostConfig;
use nexus_domain::usage::UsageRecord;
use nexus_store::usage::UsageTotals;
use nexus_store::UsageStore;

/// Per-turn caps handed back to the runner on a successful precheck.
#[derive(Debug, Clone, Copy)]
pub struct TurnCaps {
    pub max_tokens_per_turn: u32,
    pub max_tool_calls_per_turn: u32,
}

/// Snapshot of a project's spend, for the status API.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostStatus {
    pub daily_usd: f64,
    pub monthly_usd: f64,
    pub daily_tokens: u64,
    pub monthly_tokens: u64,
    pub daily_budget_usd: f64,
    pub monthly_budget_usd: f64,
}

/// Sliding-window request timestamps per project.
#[derive(Default)]
struct RateWindow {
    requests: VecDeque<DateTime<Utc>>,
}

pub struct CostGuard {
    usage: Arc<UsageStore>,
    rate_windows: Mutex<HashMap<String, RateWindow>>,
    /// One-shot alert latch keyed by `(project, period-key)`.
    alerted: Mutex<HashSet<String>>,
}

impl CostGuard {
    pub fn new(usage: Arc<UsageStore>) -> Self {
        Self {
            usage,
            rate_windows: Mutex::new(HashMap::new()),
            alerted: Mutex::new(HashSet::new()),
        }
    }

    /// Check budgets and rate limits before an LLM call.
    ///
    /// Denies when the projected daily or monthly spend would cross the
    /// hard-limit percentage of its budget, or when the sliding-window
    /// rate limits are exhausted. On success the per-turn caps are
    /// returned for the runner to enforce.
    pub async fn precheck(
        &self,
        project_id: &str,
        config: &CostConfig,
        estimated_cost_usd: f64,
    ) -> Result<TurnCaps> {
        let now = Utc::now();

        self.check_rate_limits(project_id, config, now)?;

        let totals = self.usage.totals(project_id, now).await;

        let daily_limit = config.daily_budget_usd * config.hard_limit_percent / 100.0;
        if totals.daily_usd + estimated_cost_usd > daily_limit {
            return Err(Error::BudgetExceeded(format!(
                "project {project_id}: projected daily spend {:.4} exceeds limit {:.4}",
                totals.daily_usd + estimated_cost_usd,
                daily_limit
            )));
        }

        let monthly_limit = config.monthly_budget_usd * config.hard_limit_percent / 100.0;
        if totals.monthly_usd + estimated_cost_usd > monthly_limit {
            return Err(Error::BudgetExceeded(format!(
                "project {project_id}: projected monthly spend {:.4} exceeds limit {:.4}",
                totals.monthly_usd + estimated_cost_usd,
                monthly_limit
            )));
        }

        self.maybe_alert(project_id, config, &totals, now);

        Ok(TurnCaps {
            max_tokens_per_turn: config.max_tokens_per_turn,
            max_tool_calls_per_turn: config.max_tool_calls_per_turn,
        })
    }

    /// Record one LLM call into the ledger.
    pub async fn record_usage(&self, record: UsageRecord) {
        self.usage.append(record).await;
    }

    pub async fn status(&self, project_id: &str, config: &CostConfig) -> CostStatus {
        let totals = self.usage.totals(project_id, Utc::now()).await;
        CostStatus {
            daily_usd: totals.daily_usd,
            monthly_usd: totals.monthly_usd,
            daily_tokens: totals.daily_tokens,
            monthly_tokens: totals.monthly_tokens,
            daily_budget_usd: config.daily_budget_usd,
            monthly_budget_usd: config.monthly_budget_usd,
        }
    }

    // ── Private ──────────────────────────────────────────────────────

    fn check_rate_limits(
        &self,
        project_id: &str,
        config: &CostConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if config.max_requests_per_minute.is_none() && config.max_requests_per_hour.is_none() {
            return Ok(());
        }

        let mut windows = self.rate_windows.lock();
        let window = windows.entry(project_id.to_string()).or_default();

        let hour_ago = now - chrono::Duration::hours(1);
        while window.requests.front().is_some_and(|t| *t < hour_ago) {
            window.requests.pop_front();
        }

        if let Some(per_hour) = config.max_requests_per_hour {
            if window.requests.len() as u32 >= per_hour {
                return Err(Error::RateLimited(format!(
                    "project {project_id}: {per_hour} requests/hour exhausted"
                )));
            }
        }
        if let Some(per_minute) = config.max_requests_per_minute {
            let minute_ago = now - chrono::Duration::minutes(1);
            let in_last_minute = window.requests.iter().filter(|t| **t >= minute_ago).count();
            if in_last_minute as u32 >= per_minute {
                return Err(Error::RateLimited(format!(
                    "project {project_id}: {per_minute} requests/minute exhausted"
                )));
            }
        }

        window.requests.push_back(now);
        Ok(())
    }

    /// Emit a one-shot alert when a budget first crosses the alert
    /// threshold; the latch key includes the period so the alert re-arms
    /// on the next day/month.
    fn maybe_alert(
        &self,
        project_id: &str,
        config: &CostConfig,
        totals: &UsageTotals,
        now: DateTime<Utc>,
    ) {
        let threshold = config.alert_threshold_percent / 100.0;

        let daily_key = format!("{project_id}:day:{}", now.date_naive());
        if totals.daily_usd >= config.daily_budget_usd * threshold
            && self.alerted.lock().insert(daily_key)
        {
            tracing::warn!(
                project_id,
                daily_usd = totals.daily_usd,
                daily_budget_usd = config.daily_budget_usd,
                threshold_percent = config.alert_threshold_percent,
                "daily budget alert threshold crossed"
            );
        }

        let monthly_key = format!("{project_id}:month:{}-{}", now.year(), now.month());
        if totals.monthly_usd >= config.monthly_budget_usd * threshold
            && self.alerted.lock().insert(monthly_key)
        {
            tracing::warn!(
                project_id,
                monthly_usd = totals.monthly_usd,
                monthly_budget_usd = config.monthly_budget_usd,
                threshold_percent = config.alert_threshold_percent,
                "monthly budget alert threshold crossed"
            );
        }
    }

    #[cfg(test)]
    fn alert_count(&self) -> usize {
        self.alerted.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(project: &str, cost: f64) -> UsageRecord {
        UsageRecord {
            project_id: project.into(),
            session_id: Uuid::new_v4(),
            trace_id: Uuid::new_v4(),
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            input_tokens: 1000,
            output_tokens: 200,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
            cost_usd: cost,
            timestamp: Utc::now(),
        }
    }

    fn guard() -> (tempfile::TempDir, CostGuard) {
        let dir = tempfile::tempdir().unwrap();
        let usage = Arc::new(UsageStore::new(dir.path()));
        (dir, CostGuard::new(usage))
    }

    #[tokio::test]
    async fn precheck_allows_within_budget() {
        let (_dir, guard) = guard();
        let config = CostConfig::default();
        let caps = guard.precheck("P1", &config, 0.01).await.unwrap();
        assert_eq!(caps.max_tokens_per_turn, config.max_tokens_per_turn);
        assert_eq!(caps.max_tool_calls_per_turn, config.max_tool_calls_per_turn);
    }

    #[tokio::test]
    async fn precheck_denies_over_daily_hard_limit() {
        let (_dir, guard) = guard();
        let config = CostConfig {
            daily_budget_usd: 0.001,
            ..Default::default()
        };
        // Two prior records summing to 0.002 today.
        guard.record_usage(record("P1", 0.001)).await;
        guard.record_usage(record("P1", 0.001)).await;

        let err = guard.precheck("P1", &config, 0.0001).await.unwrap_err();
        assert_eq!(err.code(), "BUDGET_EXCEEDED");
    }

    #[tokio::test]
    async fn precheck_is_per_project() {
        let (_dir, guard) = guard();
        let config = CostConfig {
            daily_budget_usd: 0.001,
            ..Default::default()
        };
        guard.record_usage(record("P2", 5.0)).await;
        assert!(guard.precheck("P1", &config, 0.0001).await.is_ok());
    }

    #[tokio::test]
    async fn rate_limit_sliding_window() {
        let (_dir, guard) = guard();
        let config = CostConfig {
            max_requests_per_minute: Some(2),
            ..Default::default()
        };
        assert!(guard.precheck("P1", &config, 0.0).await.is_ok());
        assert!(guard.precheck("P1", &config, 0.0).await.is_ok());
        let err = guard.precheck("P1", &config, 0.0).await.unwrap_err();
        assert_eq!(err.code(), "RATE_LIMITED");
        // Other projects are unaffected.
        assert!(guard.precheck("P2", &config, 0.0).await.is_ok());
    }

    #[tokio::test]
    async fn alert_fires_once_per_period() {
        let (_dir, guard) = guard();
        let config = CostConfig {
            daily_budget_usd: 1.0,
            monthly_budget_usd: 1000.0,
            alert_threshold_percent: 50.0,
            ..Default::default()
        };
        guard.record_usage(record("P1", 0.6)).await;

        guard.precheck("P1", &config, 0.0).await.unwrap();
        let after_first = guard.alert_count();
        assert!(after_first >= 1);
        guard.precheck("P1", &config, 0.0).await.unwrap();
        assert_eq!(guard.alert_count(), after_first);
    }

    #[tokio::test]
    async fn status_reports_budgets_and_spend() {
        let (_dir, guard) = guard();
        let config = CostConfig::default();
        guard.record_usage(record("P1", 0.25)).await;
        let status = guard.status("P1", &config).await;
        assert!((status.daily_usd - 0.25).abs() < 1e-9);
        assert_eq!(status.daily_budget_usd, config.daily_budget_usd);
        assert_eq!(status.daily_tokens, 1200);
    }
}
