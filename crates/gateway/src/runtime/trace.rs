//! Incremental trace construction for one turn.
//!
//! Events get monotonic sequence numbers as they are pushed; aggregates
//! accumulate alongside. `finalize` produces the immutable
//! [`ExecutionTrace`] that the trace store persists atomically.

use chrono::Utc;
use std::time::Instant;
use uuid::Uuid;

use nexus_domain::stream::TokenUsage;
use nexus_domain::trace::{
    ExecutionTrace, PromptSnapshot, TraceEvent, TraceEventKind, TraceStatus,
};

pub struct TraceBuilder {
    id: Uuid,
    project_id: String,
    session_id: Uuid,
    prompt_snapshot: PromptSnapshot,
    events: Vec<TraceEvent>,
    next_seq: u64,
    total_tokens_used: u64,
    total_cost_usd: f64,
    turn_count: u32,
    started: Instant,
    created_at: chrono::DateTime<Utc>,
}

impl TraceBuilder {
    pub fn new(project_id: &str, session_id: Uuid, prompt_snapshot: PromptSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            session_id,
            prompt_snapshot,
            events: Vec::new(),
            next_seq: 0,
            total_tokens_used: 0,
            total_cost_usd: 0.0,
            turn_count: 0,
            started: Instant::now(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn push(&mut self, kind: TraceEventKind) {
        self.events.push(TraceEvent {
            seq: self.next_seq,
            at: Utc::now(),
            kind,
        });
        self.next_seq += 1;
    }

    /// Record one completed LLM call: the response event plus aggregates.
    pub fn record_llm_response(&mut self, text: &str, usage: &TokenUsage, cost_usd: f64) {
        self.total_tokens_used += usage.total() as u64;
        self.total_cost_usd += cost_usd;
        self.push(TraceEventKind::LlmResponse {
            text: text.to_string(),
            usage: usage.clone(),
        });
    }

    pub fn begin_turn(&mut self) {
        self.turn_count += 1;
        self.push(TraceEventKind::LlmRequest);
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd
    }

    pub fn finalize(self, status: TraceStatus) -> ExecutionTrace {
        ExecutionTrace {
            id: self.id,
            project_id: self.project_id,
            session_id: self.session_id,
            prompt_snapshot: self.prompt_snapshot,
            events: self.events,
            total_duration_ms: self.started.elapsed().as_millis() as u64,
            total_tokens_used: self.total_tokens_used,
            total_cost_usd: self.total_cost_usd,
            turn_count: self.turn_count,
            status,
            created_at: self.created_at,
            completed_at: Some(Utc::now()),
        }
    }
}
