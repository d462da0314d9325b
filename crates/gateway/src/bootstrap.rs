//! Construction of the full dependency graph — no globals, everything
//! built here and passed down explicitly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Semaphore;

use nexus_domain::config::RuntimeConfig;
use nexus_mcp_client::{register_mcp_tools, McpManager};
use nexus_providers::ProviderRegistry;
use nexus_store::{
    ApprovalRepo, ContactStore, MessageStore, ProjectStore, PromptLayerStore, SecretStore,
    SessionStore, TaskRunStore, TaskStore, TraceStore, UsageStore, WebhookStore,
};
use nexus_tools::builtin::register_builtins;
use nexus_tools::ToolRegistry;

use crate::inbound::agents::{AgentConfigCache, DefaultAgentRouter, DEFAULT_AGENT_CACHE_TTL};
use crate::inbound::channels::ChannelResolver;
use crate::runtime::approval::ApprovalGate;
use crate::runtime::cancel::CancelMap;
use crate::runtime::cost::CostGuard;
use crate::runtime::prompt::PromptAssembler;
use crate::runtime::runner::AgentRunner;
use crate::runtime::sanitize::InputSanitizer;
use crate::runtime::scheduler;
use crate::runtime::session_lock::SessionLockMap;
use crate::secrets::SecretService;
use crate::state::AppState;
use crate::webhook::queue::WebhookQueue;

/// Build the application state from config.
pub async fn build_state(config: RuntimeConfig) -> anyhow::Result<AppState> {
    let config = Arc::new(config);
    let state_dir = config.resolve_state_dir();
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;
    tracing::info!(state_dir = %state_dir.display(), "state directory ready");

    // ── Stores ───────────────────────────────────────────────────────
    let projects = Arc::new(ProjectStore::new(&state_dir));
    let layers = Arc::new(PromptLayerStore::new(&state_dir));
    let sessions = Arc::new(SessionStore::new(&state_dir));
    let messages = Arc::new(MessageStore::new(&state_dir));
    let traces = Arc::new(TraceStore::new(&state_dir));
    let tasks = Arc::new(TaskStore::new(&state_dir));
    let task_runs = Arc::new(TaskRunStore::new(&state_dir));
    let contacts = Arc::new(ContactStore::new(&state_dir));
    let webhooks = Arc::new(WebhookStore::new(&state_dir));
    let approvals_repo = Arc::new(ApprovalRepo::new(&state_dir));
    let usage = Arc::new(UsageStore::new(&state_dir));
    let secrets_store = Arc::new(SecretStore::new(&state_dir));

    // ── Providers & tools ────────────────────────────────────────────
    let providers = Arc::new(ProviderRegistry::new());
    let tools = Arc::new(ToolRegistry::new());
    register_builtins(&tools).context("registering builtin tools")?;
    tracing::info!(tools = tools.len(), "builtin tools registered");

    // ── MCP servers ──────────────────────────────────────────────────
    let mcp = if config.mcp.servers.is_empty() {
        tracing::info!("no MCP servers configured");
        Arc::new(McpManager::empty())
    } else {
        tracing::info!(count = config.mcp.servers.len(), "connecting MCP servers");
        Arc::new(McpManager::connect_all(&config.mcp).await)
    };
    let mcp_tool_count = register_mcp_tools(&mcp, &tools)
        .await
        .unwrap_or_default();
    if mcp_tool_count > 0 {
        tracing::info!(
            servers = mcp.server_count().await,
            tools = mcp_tool_count,
            "MCP tools registered"
        );
    }

    // ── Runtime services ─────────────────────────────────────────────
    let cost = Arc::new(CostGuard::new(usage.clone()));
    let approvals = Arc::new(ApprovalGate::new(
        approvals_repo.clone(),
        config.approval.ttl_seconds,
    ));
    let sanitizer = Arc::new(InputSanitizer::new(config.sanitizer.clone()));
    let prompts = Arc::new(PromptAssembler::new(layers.clone()));
    let secrets = Arc::new(
        SecretService::from_env(secrets_store.clone()).context("initializing secret service")?,
    );
    let runner = Arc::new(AgentRunner::new(
        tools.clone(),
        cost.clone(),
        approvals.clone(),
        sessions.clone(),
        messages.clone(),
        traces.clone(),
    ));

    // ── Channels & caches ────────────────────────────────────────────
    let channels = Arc::new(ChannelResolver::new());
    let agent_cache = Arc::new(AgentConfigCache::new(
        projects.clone(),
        DEFAULT_AGENT_CACHE_TTL,
    ));
    let webhook_queue = Arc::new(WebhookQueue::new(config.webhook_queue.clone()));

    Ok(AppState {
        config: config.clone(),
        providers,
        tools,
        mcp,
        projects,
        layers,
        sessions,
        messages,
        traces,
        tasks,
        task_runs,
        contacts,
        webhooks,
        approvals_repo,
        usage,
        secrets_store,
        runner,
        cost,
        approvals,
        sanitizer,
        prompts,
        secrets,
        channels,
        agent_cache,
        agent_router: Arc::new(DefaultAgentRouter),
        webhook_queue,
        session_locks: Arc::new(SessionLockMap::new()),
        project_locks: Arc::new(SessionLockMap::new()),
        cancel_map: Arc::new(CancelMap::new()),
        scheduler_pool: Arc::new(Semaphore::new(config.scheduler.worker_pool_size.max(1))),
    })
}

/// Start the background loops: the scheduler tick, the webhook queue
/// workers, and periodic lock pruning.
pub async fn spawn_background(state: &AppState) {
    scheduler::spawn(state.clone());
    tracing::info!(
        tick_seconds = state.config.scheduler.tick_seconds,
        workers = state.config.scheduler.worker_pool_size,
        "scheduler started"
    );

    state.webhook_queue.spawn_workers(state.clone()).await;

    // Periodic session/project lock pruning.
    {
        let session_locks = state.session_locks.clone();
        let project_locks = state.project_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                session_locks.prune_idle();
                project_locks.prune_idle();
            }
        });
    }
}
