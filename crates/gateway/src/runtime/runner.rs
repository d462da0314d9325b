//! The agent turn loop — the orchestrator that streams LLM responses,
//! dispatches tool calls, and finalizes the execution trace.
//!
//! One call to [`AgentRunner::run`] is one turn: zero or more provider
//! calls and at most one assistant reply. Tool calls execute serially in
//! declaration order so the tool_use/tool_result pairing the provider
//! expects is preserved exactly.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use nexus_domain::cancel::CancelToken;
use nexus_domain::error::{Error, Result};
use nexus_domain::project::Project;
use nexus_domain::session::StoredMessage;
use nexus_domain::stream::{ChatEvent, StopReason, TokenUsage};
use nexus_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};
use nexus_domain::trace::{ExecutionTrace, PromptSnapshot, TraceEventKind, TraceStatus};
use nexus_domain::usage::UsageRecord;
use nexus_memory::{MemoryManager, TokenCounter};
use nexus_providers::{failover, pricing, ChatParams, ProviderAdapter};
use nexus_store::{MessageStore, SessionStore, TraceStore};
use nexus_tools::{execute_validated, ExecutionContext, ToolRegistry};

use super::approval::ApprovalGate;
use super::cost::{CostGuard, TurnCaps};
use super::trace::TraceBuilder;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / outcome types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything one turn needs, built by the caller (chat API, inbound
/// processor, webhook processor, scheduler).
pub struct TurnRequest {
    pub project: Project,
    pub session_id: Uuid,
    /// Already sanitized.
    pub user_message: String,
    pub system_prompt: String,
    pub prompt_snapshot: PromptSnapshot,
    /// Prior conversation (no system message).
    pub history: Vec<Message>,
    /// Scheduler runs cap cumulative trace cost.
    pub per_run_budget_usd: Option<f64>,
    /// Scheduler tasks may tighten the turn limit.
    pub max_turns_override: Option<u32>,
    pub cancel: CancelToken,
    /// When present, every provider event is forwarded (SSE streaming).
    pub events: Option<mpsc::Sender<ChatEvent>>,
}

/// A completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    pub trace: ExecutionTrace,
    pub response_text: String,
    /// Tool calls executed across the whole turn, in order.
    pub executed_tool_calls: Vec<ToolCall>,
    /// The final LLM call stopped on max_tokens.
    pub truncated: bool,
}

/// Bridges the provider's token estimate into the memory manager.
struct AdapterTokenCounter(Arc<dyn ProviderAdapter>);

impl TokenCounter for AdapterTokenCounter {
    fn count(&self, messages: &[Message]) -> u32 {
        self.0.count_tokens(messages)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentRunner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentRunner {
    tools: Arc<ToolRegistry>,
    cost: Arc<CostGuard>,
    approvals: Arc<ApprovalGate>,
    sessions: Arc<SessionStore>,
    messages: Arc<MessageStore>,
    traces: Arc<TraceStore>,
}

impl AgentRunner {
    pub fn new(
        tools: Arc<ToolRegistry>,
        cost: Arc<CostGuard>,
        approvals: Arc<ApprovalGate>,
        sessions: Arc<SessionStore>,
        messages: Arc<MessageStore>,
        traces: Arc<TraceStore>,
    ) -> Self {
        Self {
            tools,
            cost,
            approvals,
            sessions,
            messages,
            traces,
        }
    }

    /// Run one turn against the given provider.
    pub async fn run(
        &self,
        provider: Arc<dyn ProviderAdapter>,
        req: TurnRequest,
    ) -> Result<TurnOutcome> {
        let cost_cfg = req.project.agent_config.cost.clone();
        let failover_rules = req.project.agent_config.failover.clone();
        let memory = MemoryManager::new(
            req.project.agent_config.memory.clone(),
            Arc::new(AdapterTokenCounter(provider.clone())),
        );

        let mut trace = TraceBuilder::new(&req.project.id, req.session_id, req.prompt_snapshot.clone());
        let trace_id = trace.id();
        tracing::debug!(trace_id = %trace_id, "turn started");

        // The user message is persisted up front; it survives
        // cancellation (no partial assistant message ever will).
        self.messages
            .append(
                StoredMessage::new(
                    req.session_id,
                    Role::User,
                    MessageContent::Text(req.user_message.clone()),
                )
                .with_trace(trace_id),
            )
            .await;
        self.sessions.touch(req.session_id).await;

        let tool_defs = self
            .tools
            .definitions_for(&req.project.agent_config.allowed_tools);

        let mut messages: Vec<Message> = req.history.clone();
        messages.push(Message::user(&req.user_message));

        let max_turns = req
            .max_turns_override
            .unwrap_or(cost_cfg.max_turns_per_session);
        let mut executed_tool_calls: Vec<ToolCall> = Vec::new();
        let mut last_text = String::new();

        loop {
            // ── Turn limit ───────────────────────────────────────────
            if trace.turn_count() >= max_turns {
                tracing::warn!(max_turns, "turn limit reached");
                let trace = trace.finalize(TraceStatus::MaxTurns);
                self.persist_trace(&trace).await;
                return Ok(TurnOutcome {
                    trace,
                    response_text: last_text,
                    executed_tool_calls,
                    truncated: false,
                });
            }

            if req.cancel.is_cancelled() {
                return Err(self.fail_canceled(trace, "canceled before LLM call").await);
            }

            // ── Fit context, precheck budget ─────────────────────────
            let fitted = memory.fit_to_context_window(&messages, provider.context_window());
            let planned_tokens = provider.count_tokens(&fitted);
            let planned_cost = pricing::estimate_planned_cost(provider.model(), planned_tokens);

            let caps = match self
                .cost
                .precheck(&req.project.id, &cost_cfg, planned_cost)
                .await
            {
                Ok(caps) => caps,
                Err(e) if trace.turn_count() == 0 => {
                    // Denied before anything ran: no trace is persisted.
                    return Err(e);
                }
                Err(e) => {
                    trace.push(TraceEventKind::Error {
                        message: e.to_string(),
                    });
                    let trace = trace.finalize(TraceStatus::Failed);
                    self.persist_trace(&trace).await;
                    return Err(e);
                }
            };

            // ── Open the provider stream ─────────────────────────────
            trace.begin_turn();
            let params = ChatParams {
                messages: fitted,
                tools: tool_defs.clone(),
                system_prompt: Some(req.system_prompt.clone()),
                max_tokens: req
                    .project
                    .agent_config
                    .provider
                    .max_tokens
                    .min(caps.max_tokens_per_turn),
                temperature: req.project.agent_config.provider.temperature,
                stop_sequences: Vec::new(),
                trace_id,
            };

            let mut stream =
                match failover::open_stream(provider.as_ref(), &params, &failover_rules).await {
                    Ok(s) => s,
                    Err(e) => {
                        trace.push(TraceEventKind::Error {
                            message: e.to_string(),
                        });
                        let trace = trace.finalize(TraceStatus::Failed);
                        self.persist_trace(&trace).await;
                        return Err(e);
                    }
                };

            // ── Consume the stream ───────────────────────────────────
            let mut text_buf = String::new();
            let mut pending_tool_calls: Vec<ToolCall> = Vec::new();
            let mut message_end: Option<(StopReason, TokenUsage)> = None;
            let mut stream_error: Option<String> = None;

            while let Some(event_result) = stream.next().await {
                if req.cancel.is_cancelled() {
                    drop(stream);
                    return Err(self.fail_canceled(trace, "canceled during streaming").await);
                }

                let event = match event_result {
                    Ok(ev) => ev,
                    Err(e) => {
                        stream_error = Some(e.to_string());
                        break;
                    }
                };

                if let Some(tx) = &req.events {
                    let _ = tx.send(event.clone()).await;
                }

                match event {
                    ChatEvent::ContentDelta { text } => text_buf.push_str(&text),
                    ChatEvent::ToolUseEnd { id, name, input } => {
                        pending_tool_calls.push(ToolCall {
                            call_id: id,
                            tool_id: name,
                            input,
                        });
                    }
                    ChatEvent::MessageEnd { stop_reason, usage } => {
                        message_end = Some((stop_reason, usage));
                    }
                    ChatEvent::Error { cause } => {
                        stream_error = Some(cause);
                        break;
                    }
                    ChatEvent::MessageStart { .. }
                    | ChatEvent::ToolUseStart { .. }
                    | ChatEvent::ToolUseDelta { .. } => {}
                }
            }

            if let Some(cause) = stream_error {
                trace.push(TraceEventKind::Error {
                    message: cause.clone(),
                });
                let trace = trace.finalize(TraceStatus::Failed);
                self.persist_trace(&trace).await;
                return Err(Error::Provider {
                    provider: provider.provider_id().to_string(),
                    message: cause,
                    retryable: false,
                });
            }

            let (stop_reason, usage) = message_end.unwrap_or((StopReason::EndTurn, TokenUsage::default()));

            // ── Ledger + trace aggregates ────────────────────────────
            let call_cost = pricing::estimate_cost(provider.model(), &usage);
            self.cost
                .record_usage(UsageRecord {
                    project_id: req.project.id.clone(),
                    session_id: req.session_id,
                    trace_id,
                    provider: provider.provider_id().to_string(),
                    model: provider.model().to_string(),
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    cache_read_tokens: usage.cache_read_tokens.unwrap_or(0),
                    cache_write_tokens: usage.cache_write_tokens.unwrap_or(0),
                    cost_usd: call_cost,
                    timestamp: chrono::Utc::now(),
                })
                .await;
            trace.record_llm_response(&text_buf, &usage, call_cost);
            last_text = text_buf.clone();

            // ── Per-run budget (scheduled tasks) ─────────────────────
            if let Some(budget) = req.per_run_budget_usd {
                if trace.total_cost_usd() > budget {
                    let message = format!(
                        "per-run budget {budget:.4} USD exceeded ({:.4} spent)",
                        trace.total_cost_usd()
                    );
                    trace.push(TraceEventKind::Error {
                        message: message.clone(),
                    });
                    let trace = trace.finalize(TraceStatus::Failed);
                    self.persist_trace(&trace).await;
                    return Err(Error::BudgetExceeded(message));
                }
            }

            // ── Final answer ─────────────────────────────────────────
            if stop_reason != StopReason::ToolUse || pending_tool_calls.is_empty() {
                let mut stored = StoredMessage::new(
                    req.session_id,
                    Role::Assistant,
                    MessageContent::Text(text_buf.clone()),
                )
                .with_trace(trace_id);
                stored.usage = Some(usage);
                self.messages.append(stored).await;
                self.sessions.touch(req.session_id).await;

                let trace = trace.finalize(TraceStatus::Completed);
                self.persist_trace(&trace).await;
                tracing::debug!(trace_id = %trace_id, turns = trace.turn_count, "turn completed");
                return Ok(TurnOutcome {
                    trace,
                    response_text: text_buf,
                    executed_tool_calls,
                    truncated: stop_reason == StopReason::MaxTokens,
                });
            }

            // ── Tool dispatch, serial, in declaration order ──────────
            let mut result_parts: Vec<ContentPart> = Vec::with_capacity(pending_tool_calls.len());
            for (index, call) in pending_tool_calls.iter().enumerate() {
                if req.cancel.is_cancelled() {
                    trace.push(TraceEventKind::ToolResult {
                        tool_call_id: call.call_id.clone(),
                        output: "canceled".into(),
                        is_error: true,
                    });
                    return Err(self.fail_canceled(trace, "canceled during tool dispatch").await);
                }

                let (output, is_error) =
                    self.execute_tool_call(call, index, &caps, &req, trace_id, &mut trace).await;
                result_parts.push(ContentPart::tool_result(&call.call_id, output, is_error));
            }

            // One assistant message with all tool_use parts, one user
            // message with all tool_result parts, same order.
            let assistant_msg = Message::assistant_tool_uses(&text_buf, &pending_tool_calls);
            let results_msg = Message::tool_results(result_parts);

            let mut stored_assistant = StoredMessage::new(
                req.session_id,
                Role::Assistant,
                assistant_msg.content.clone(),
            )
            .with_trace(trace_id);
            stored_assistant.tool_calls = Some(pending_tool_calls.clone());
            stored_assistant.usage = Some(usage);
            let stored_results =
                StoredMessage::new(req.session_id, Role::User, results_msg.content.clone())
                    .with_trace(trace_id);
            self.messages
                .append_all(vec![stored_assistant, stored_results])
                .await;

            messages.push(assistant_msg);
            messages.push(results_msg);
            executed_tool_calls.extend(pending_tool_calls);
        }
    }

    // ── Single tool call ─────────────────────────────────────────────

    /// Execute one tool call, including allowlist and approval gating.
    /// Failures are captured into the result — never fatal to the turn.
    async fn execute_tool_call(
        &self,
        call: &ToolCall,
        index: usize,
        caps: &TurnCaps,
        req: &TurnRequest,
        trace_id: Uuid,
        trace: &mut TraceBuilder,
    ) -> (String, bool) {
        trace.push(TraceEventKind::ToolCall {
            tool_call_id: call.call_id.clone(),
            tool_id: call.tool_id.clone(),
            input: call.input.clone(),
        });

        let (output, is_error) = self
            .execute_tool_call_inner(call, index, caps, req, trace_id, trace)
            .await;

        trace.push(TraceEventKind::ToolResult {
            tool_call_id: call.call_id.clone(),
            output: output.clone(),
            is_error,
        });
        (output, is_error)
    }

    async fn execute_tool_call_inner(
        &self,
        call: &ToolCall,
        index: usize,
        caps: &TurnCaps,
        req: &TurnRequest,
        trace_id: Uuid,
        trace: &mut TraceBuilder,
    ) -> (String, bool) {
        if index as u32 >= caps.max_tool_calls_per_turn {
            return (
                format!(
                    "TOOL_EXECUTION_ERROR: per-turn tool call limit ({}) reached",
                    caps.max_tool_calls_per_turn
                ),
                true,
            );
        }

        if !req
            .project
            .agent_config
            .allowed_tools
            .iter()
            .any(|t| t == &call.tool_id)
        {
            return (
                format!(
                    "TOOL_NOT_ALLOWED: '{}' is not permitted for this project",
                    call.tool_id
                ),
                true,
            );
        }

        let Some(tool) = self.tools.get(&call.tool_id) else {
            return (
                format!("TOOL_NOT_ALLOWED: '{}' is not registered", call.tool_id),
                true,
            );
        };

        // ── Approval gating ──────────────────────────────────────────
        if self.tools.requires_approval(tool.as_ref()) {
            let approval = self
                .approvals
                .request_approval(
                    &req.project.id,
                    req.session_id,
                    &call.call_id,
                    &call.tool_id,
                    call.input.clone(),
                    tool.risk_level(),
                )
                .await;
            trace.push(TraceEventKind::ApprovalWait {
                approval_id: approval.id,
            });

            let status = self
                .approvals
                .wait_resolution(approval.id, &req.cancel)
                .await;
            use nexus_domain::approval::ApprovalStatus;
            return match status {
                ApprovalStatus::Approved => {
                    self.run_tool(tool.as_ref(), call, req, trace_id).await
                }
                ApprovalStatus::Denied => (
                    format!("APPROVAL_DENIED: '{}' was denied", call.tool_id),
                    true,
                ),
                ApprovalStatus::Pending if req.cancel.is_cancelled() => ("canceled".into(), true),
                ApprovalStatus::Expired | ApprovalStatus::Pending => (
                    format!("APPROVAL_DENIED: approval for '{}' expired", call.tool_id),
                    true,
                ),
            };
        }

        self.run_tool(tool.as_ref(), call, req, trace_id).await
    }

    async fn run_tool(
        &self,
        tool: &dyn nexus_tools::ExecutableTool,
        call: &ToolCall,
        req: &TurnRequest,
        trace_id: Uuid,
    ) -> (String, bool) {
        let ctx = ExecutionContext {
            project_id: req.project.id.clone(),
            session_id: req.session_id,
            trace_id,
            agent_config: req.project.agent_config.clone(),
            allowed_tools: req.project.agent_config.allowed_tools.clone(),
            cancel: req.cancel.clone(),
        };
        let result = execute_validated(tool, call.input.clone(), &ctx).await;
        (result.output_text(), !result.success)
    }

    // ── Failure paths ────────────────────────────────────────────────

    async fn fail_canceled(&self, mut trace: TraceBuilder, context: &str) -> Error {
        tracing::info!(context, "turn canceled");
        trace.push(TraceEventKind::Error {
            message: format!("canceled: {context}"),
        });
        let trace = trace.finalize(TraceStatus::Failed);
        self.persist_trace(&trace).await;
        Error::Internal("turn canceled".into())
    }

    async fn persist_trace(&self, trace: &ExecutionTrace) {
        if let Err(e) = self.traces.insert(trace.clone()).await {
            tracing::warn!(trace_id = %trace.id, error = %e, "failed to persist trace");
        }
    }
}
