//! Shared application state passed to all API handlers and background
//! loops. No globals: everything is constructed in bootstrap and handed
//! down explicitly.

use std::sync::Arc;

use tokio::sync::Semaphore;

use nexus_domain::config::RuntimeConfig;
use nexus_mcp_client::McpManager;
use nexus_providers::ProviderRegistry;
use nexus_store::{
    ApprovalRepo, ContactStore, MessageStore, ProjectStore, PromptLayerStore, SecretStore,
    SessionStore, TaskRunStore, TaskStore, TraceStore, UsageStore, WebhookStore,
};
use nexus_tools::ToolRegistry;

use crate::inbound::agents::{AgentConfigCache, AgentRouter};
use crate::inbound::channels::ChannelResolver;
use crate::runtime::approval::ApprovalGate;
use crate::runtime::cancel::CancelMap;
use crate::runtime::cost::CostGuard;
use crate::runtime::prompt::PromptAssembler;
use crate::runtime::runner::AgentRunner;
use crate::runtime::sanitize::InputSanitizer;
use crate::runtime::session_lock::SessionLockMap;
use crate::secrets::SecretService;
use crate::webhook::queue::WebhookQueue;

/// Fields are grouped by concern:
/// - **Config & providers** — runtime config, LLM adapter registry
/// - **Stores** — the typed repositories
/// - **Runtime services** — runner, cost guard, approval gate, sanitizer
/// - **Channels & webhooks** — resolver, caches, async queue
/// - **Concurrency** — session locks, cancel tokens, scheduler pool
#[derive(Clone)]
pub struct AppState {
    // ── Config & providers ───────────────────────────────────────────
    pub config: Arc<RuntimeConfig>,
    pub providers: Arc<ProviderRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub mcp: Arc<McpManager>,

    // ── Stores ───────────────────────────────────────────────────────
    pub projects: Arc<ProjectStore>,
    pub layers: Arc<PromptLayerStore>,
    pub sessions: Arc<SessionStore>,
    pub messages: Arc<MessageStore>,
    pub traces: Arc<TraceStore>,
    pub tasks: Arc<TaskStore>,
    pub task_runs: Arc<TaskRunStore>,
    pub contacts: Arc<ContactStore>,
    pub webhooks: Arc<WebhookStore>,
    pub approvals_repo: Arc<ApprovalRepo>,
    pub usage: Arc<UsageStore>,
    pub secrets_store: Arc<SecretStore>,

    // ── Runtime services ─────────────────────────────────────────────
    pub runner: Arc<AgentRunner>,
    pub cost: Arc<CostGuard>,
    pub approvals: Arc<ApprovalGate>,
    pub sanitizer: Arc<InputSanitizer>,
    pub prompts: Arc<PromptAssembler>,
    pub secrets: Arc<SecretService>,

    // ── Channels & webhooks ──────────────────────────────────────────
    pub channels: Arc<ChannelResolver>,
    pub agent_cache: Arc<AgentConfigCache>,
    pub agent_router: Arc<dyn AgentRouter>,
    pub webhook_queue: Arc<WebhookQueue>,

    // ── Concurrency ──────────────────────────────────────────────────
    pub session_locks: Arc<SessionLockMap>,
    pub project_locks: Arc<SessionLockMap>,
    pub cancel_map: Arc<CancelMap>,
    pub scheduler_pool: Arc<Semaphore>,
}
