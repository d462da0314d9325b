//! Project — the tenant root — and the embedded agent configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

/// Tenant root. Owns every record keyed by `project_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub tags: Vec<String>,
    pub agent_config: AgentConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which LLM backend a project talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Provider id: "anthropic" or "openai" (OpenAI-compatible endpoint).
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key (never the key itself).
    pub api_key_env_var: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    4096
}

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverRules {
    #[serde(default = "default_true")]
    pub retry_on_rate_limit: bool,
    #[serde(default = "default_true")]
    pub retry_on_server_error: bool,
    #[serde(default = "default_true")]
    pub retry_on_timeout: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for FailoverRules {
    fn default() -> Self {
        Self {
            retry_on_rate_limit: true,
            retry_on_server_error: true,
            retry_on_timeout: true,
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PruningStrategy {
    TurnBased,
    TokenBased,
}

impl Default for PruningStrategy {
    fn default() -> Self {
        Self::TurnBased
    }
}

/// Context-window and long-term memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    #[serde(default)]
    pub long_term_enabled: bool,
    /// Half-life in days for similarity decay. None disables decay.
    #[serde(default)]
    pub decay_half_life_days: Option<f64>,
    #[serde(default = "default_reserve_tokens")]
    pub reserve_tokens: u32,
    #[serde(default)]
    pub pruning_strategy: PruningStrategy,
    #[serde(default = "default_memory_max_turns")]
    pub max_turns: usize,
    #[serde(default)]
    pub compaction_enabled: bool,
}

fn default_reserve_tokens() -> u32 {
    2048
}
fn default_memory_max_turns() -> usize {
    20
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            long_term_enabled: false,
            decay_half_life_days: None,
            reserve_tokens: default_reserve_tokens(),
            pruning_strategy: PruningStrategy::default(),
            max_turns: default_memory_max_turns(),
            compaction_enabled: false,
        }
    }
}

/// Budget envelope and per-turn caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostConfig {
    #[serde(default = "default_daily_budget")]
    pub daily_budget_usd: f64,
    #[serde(default = "default_monthly_budget")]
    pub monthly_budget_usd: f64,
    #[serde(default = "default_max_tokens_per_turn")]
    pub max_tokens_per_turn: u32,
    #[serde(default = "default_max_turns_per_session")]
    pub max_turns_per_session: u32,
    #[serde(default = "default_max_tool_calls_per_turn")]
    pub max_tool_calls_per_turn: u32,
    /// First crossing of this percentage of a budget emits a one-shot alert.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_percent: f64,
    /// Requests are denied when a budget projection exceeds this percentage.
    #[serde(default = "default_hard_limit")]
    pub hard_limit_percent: f64,
    #[serde(default)]
    pub max_requests_per_minute: Option<u32>,
    #[serde(default)]
    pub max_requests_per_hour: Option<u32>,
}

fn default_daily_budget() -> f64 {
    10.0
}
fn default_monthly_budget() -> f64 {
    200.0
}
fn default_max_tokens_per_turn() -> u32 {
    32_000
}
fn default_max_turns_per_session() -> u32 {
    25
}
fn default_max_tool_calls_per_turn() -> u32 {
    10
}
fn default_alert_threshold() -> f64 {
    80.0
}
fn default_hard_limit() -> f64 {
    100.0
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            daily_budget_usd: default_daily_budget(),
            monthly_budget_usd: default_monthly_budget(),
            max_tokens_per_turn: default_max_tokens_per_turn(),
            max_turns_per_session: default_max_turns_per_session(),
            max_tool_calls_per_turn: default_max_tool_calls_per_turn(),
            alert_threshold_percent: default_alert_threshold(),
            hard_limit_percent: default_hard_limit(),
            max_requests_per_minute: None,
            max_requests_per_hour: None,
        }
    }
}

/// Per-project agent configuration, embedded in [`Project`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub provider: ProviderSpec,
    #[serde(default)]
    pub failover: FailoverRules,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub cost: CostConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_config_deserializes_with_defaults() {
        let json = serde_json::json!({
            "provider": {
                "provider": "anthropic",
                "model": "claude-sonnet-4-20250514",
                "apiKeyEnvVar": "ANTHROPIC_API_KEY"
            }
        });
        let cfg: AgentConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.provider.max_tokens, 4096);
        assert_eq!(cfg.failover.max_retries, 3);
        assert!(cfg.failover.retry_on_rate_limit);
        assert_eq!(cfg.cost.hard_limit_percent, 100.0);
        assert_eq!(cfg.cost.max_turns_per_session, 25);
        assert_eq!(cfg.memory.pruning_strategy, PruningStrategy::TurnBased);
        assert!(cfg.allowed_tools.is_empty());
    }

    #[test]
    fn pruning_strategy_kebab_case() {
        assert_eq!(
            serde_json::to_string(&PruningStrategy::TokenBased).unwrap(),
            "\"token-based\""
        );
    }
}
