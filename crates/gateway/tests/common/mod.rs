//! Shared harness for gateway integration tests: a fully wired
//! [`AppState`] over temp-dir stores and a scripted provider adapter.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use nexus_domain::config::RuntimeConfig;
use nexus_domain::error::Result;
use nexus_domain::layer::LayerType;
use nexus_domain::project::{AgentConfig, CostConfig, Project, ProviderSpec};
use nexus_domain::stream::{BoxStream, ChatEvent, StopReason, TokenUsage};
use nexus_domain::tool::{Message, ToolDefinition};
use nexus_gateway::inbound::agents::{
    AgentConfigCache, DefaultAgentRouter, DEFAULT_AGENT_CACHE_TTL,
};
use nexus_gateway::inbound::channels::ChannelResolver;
use nexus_gateway::runtime::approval::ApprovalGate;
use nexus_gateway::runtime::cancel::CancelMap;
use nexus_gateway::runtime::cost::CostGuard;
use nexus_gateway::runtime::prompt::PromptAssembler;
use nexus_gateway::runtime::runner::AgentRunner;
use nexus_gateway::runtime::sanitize::InputSanitizer;
use nexus_gateway::runtime::session_lock::SessionLockMap;
use nexus_gateway::secrets::SecretService;
use nexus_gateway::state::AppState;
use nexus_gateway::webhook::queue::WebhookQueue;
use nexus_mcp_client::McpManager;
use nexus_providers::{ChatParams, ProviderAdapter, ProviderRegistry};
use nexus_store::{
    ApprovalRepo, ContactStore, MessageStore, ProjectStore, PromptLayerStore, SecretStore,
    SessionStore, TaskRunStore, TaskStore, TraceStore, UsageStore, WebhookStore,
};
use nexus_tools::builtin::register_builtins;
use nexus_tools::ToolRegistry;

const TEST_MASTER_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Build an [`AppState`] backed by a temp directory.
pub async fn test_state(dir: &std::path::Path) -> AppState {
    let config = Arc::new(RuntimeConfig::default());

    let projects = Arc::new(ProjectStore::new(dir));
    let layers = Arc::new(PromptLayerStore::new(dir));
    let sessions = Arc::new(SessionStore::new(dir));
    let messages = Arc::new(MessageStore::new(dir));
    let traces = Arc::new(TraceStore::new(dir));
    let tasks = Arc::new(TaskStore::new(dir));
    let task_runs = Arc::new(TaskRunStore::new(dir));
    let contacts = Arc::new(ContactStore::new(dir));
    let webhooks = Arc::new(WebhookStore::new(dir));
    let approvals_repo = Arc::new(ApprovalRepo::new(dir));
    let usage = Arc::new(UsageStore::new(dir));
    let secrets_store = Arc::new(SecretStore::new(dir));

    let providers = Arc::new(ProviderRegistry::new());
    let tools = Arc::new(ToolRegistry::new());
    register_builtins(&tools).unwrap();

    let cost = Arc::new(CostGuard::new(usage.clone()));
    let approvals = Arc::new(ApprovalGate::new(approvals_repo.clone(), 300));
    let runner = Arc::new(AgentRunner::new(
        tools.clone(),
        cost.clone(),
        approvals.clone(),
        sessions.clone(),
        messages.clone(),
        traces.clone(),
    ));

    AppState {
        config: config.clone(),
        providers,
        tools,
        mcp: Arc::new(McpManager::empty()),
        projects: projects.clone(),
        layers: layers.clone(),
        sessions,
        messages,
        traces,
        tasks,
        task_runs,
        contacts,
        webhooks,
        approvals_repo,
        usage,
        secrets_store: secrets_store.clone(),
        runner,
        cost,
        approvals,
        sanitizer: Arc::new(InputSanitizer::new(config.sanitizer.clone())),
        prompts: Arc::new(PromptAssembler::new(layers)),
        secrets: Arc::new(SecretService::new(secrets_store, TEST_MASTER_KEY).unwrap()),
        channels: Arc::new(ChannelResolver::new()),
        agent_cache: Arc::new(AgentConfigCache::new(projects, DEFAULT_AGENT_CACHE_TTL)),
        agent_router: Arc::new(DefaultAgentRouter),
        webhook_queue: Arc::new(WebhookQueue::new(config.webhook_queue.clone())),
        session_locks: Arc::new(SessionLockMap::new()),
        project_locks: Arc::new(SessionLockMap::new()),
        cancel_map: Arc::new(CancelMap::new()),
        scheduler_pool: Arc::new(Semaphore::new(4)),
    }
}

pub fn test_provider_spec() -> ProviderSpec {
    ProviderSpec {
        provider: "anthropic".into(),
        model: "claude-sonnet-4-20250514".into(),
        api_key_env_var: "NEXUS_TEST_UNUSED_KEY".into(),
        base_url: None,
        temperature: None,
        max_tokens: 4096,
    }
}

pub fn test_project(id: &str, allowed_tools: Vec<String>) -> Project {
    let now = Utc::now();
    Project {
        id: id.into(),
        name: format!("{id} test project"),
        owner: "ops".into(),
        environment: Default::default(),
        tags: vec![],
        agent_config: AgentConfig {
            provider: test_provider_spec(),
            failover: Default::default(),
            allowed_tools,
            memory: Default::default(),
            cost: CostConfig::default(),
        },
        created_at: now,
        updated_at: now,
    }
}

/// Seed and activate the three prompt layers for a project.
pub async fn seed_layers(state: &AppState, project_id: &str) {
    for (layer_type, content) in [
        (LayerType::Identity, "You are Nexus."),
        (LayerType::Instructions, "Answer concisely."),
        (LayerType::Safety, "Refuse harmful requests."),
    ] {
        state
            .layers
            .create(
                project_id,
                layer_type,
                content.into(),
                "admin".into(),
                "initial".into(),
                true,
            )
            .await
            .unwrap();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Returns one pre-scripted event sequence per `chat` call, with an
/// optional delay before the stream starts (for timeout tests).
#[derive(Debug)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<ChatEvent>>>,
    pub delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<ChatEvent>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            delay: None,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            delay: Some(delay),
        })
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ScriptedProvider {
    async fn chat(&self, _params: &ChatParams) -> Result<BoxStream<'static, Result<ChatEvent>>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let events = self.scripts.lock().pop_front().unwrap_or_else(|| {
            vec![
                ChatEvent::MessageStart {
                    message_id: "msg_default".into(),
                },
                ChatEvent::MessageEnd {
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                },
            ]
        });
        Ok(Box::pin(futures_util::stream::iter(
            events.into_iter().map(Ok),
        )))
    }

    fn count_tokens(&self, messages: &[Message]) -> u32 {
        nexus_providers::estimate_tokens(messages)
    }

    fn context_window(&self) -> u32 {
        200_000
    }

    fn supports_tool_use(&self) -> bool {
        true
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        "claude-sonnet-4-20250514"
    }
}

/// Convenience builders for scripted event sequences.
pub fn text_reply(text: &str, input_tokens: u32, output_tokens: u32) -> Vec<ChatEvent> {
    vec![
        ChatEvent::MessageStart {
            message_id: "msg_1".into(),
        },
        ChatEvent::ContentDelta { text: text.into() },
        ChatEvent::MessageEnd {
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens,
                output_tokens,
                cache_read_tokens: None,
                cache_write_tokens: None,
            },
        },
    ]
}

pub fn tool_use_reply(call_id: &str, tool: &str, input: serde_json::Value) -> Vec<ChatEvent> {
    vec![
        ChatEvent::MessageStart {
            message_id: "msg_t".into(),
        },
        ChatEvent::ToolUseStart {
            id: call_id.into(),
            name: tool.into(),
        },
        ChatEvent::ToolUseDelta {
            id: call_id.into(),
            partial_input: input.to_string(),
        },
        ChatEvent::ToolUseEnd {
            id: call_id.into(),
            name: tool.into(),
            input,
        },
        ChatEvent::MessageEnd {
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage {
                input_tokens: 50,
                output_tokens: 10,
                cache_read_tokens: None,
                cache_write_tokens: None,
            },
        },
    ]
}

#[allow(dead_code)]
pub fn tool_definition(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: format!("{name} test tool"),
        input_schema: serde_json::json!({"type": "object"}),
    }
}
