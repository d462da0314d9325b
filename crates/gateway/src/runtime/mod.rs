//! Core runtime — ties sanitization, prompt assembly, provider
//! resolution, and the turn loop into one entry point shared by the chat
//! API, the inbound processor, the webhook processor, and the scheduler.

pub mod approval;
pub mod cancel;
pub mod cost;
pub mod cron;
pub mod prompt;
pub mod runner;
pub mod sanitize;
pub mod scheduler;
pub mod session_lock;
pub mod trace;

use tokio::sync::mpsc;
use uuid::Uuid;

use nexus_domain::cancel::CancelToken;
use nexus_domain::error::Result;
use nexus_domain::project::Project;
use nexus_domain::session::StoredMessage;
use nexus_domain::stream::ChatEvent;
use nexus_domain::tool::{Message, Role};

use crate::state::AppState;
use runner::{TurnOutcome, TurnRequest};

/// One unit of agent work, however it arrived.
pub struct TurnJob {
    pub project: Project,
    pub session_id: Uuid,
    /// Raw user text; sanitized here before it reaches the runner.
    pub raw_message: String,
    pub per_run_budget_usd: Option<f64>,
    pub max_turns_override: Option<u32>,
    /// Explicit token (scheduler timeouts); otherwise one is registered
    /// in the cancel map under the session id.
    pub cancel: Option<CancelToken>,
    pub events: Option<mpsc::Sender<ChatEvent>>,
}

/// Run one turn end to end: sanitize → assemble prompt → load history →
/// resolve provider → run, serialized per session.
pub async fn execute_turn(state: &AppState, job: TurnJob) -> Result<TurnOutcome> {
    let sanitized = state.sanitizer.sanitize(&job.raw_message)?;
    if sanitized.injection_detected {
        tracing::warn!(
            project_id = %job.project.id,
            session_id = %job.session_id,
            "sanitizer flagged inbound message"
        );
    }

    let assembled = state.prompts.assemble(&job.project.id).await?;
    let provider = state.providers.resolve(&job.project.agent_config.provider)?;

    // Turns for the same session are serialized; the permit drops at
    // the end of this scope, including on error.
    let _permit = state.session_locks.acquire(&job.session_id.to_string()).await;

    let history = load_history(state, job.session_id).await;

    let (cancel, registered) = match job.cancel {
        Some(token) => (token, false),
        None => (state.cancel_map.register(job.session_id), true),
    };

    let project_id = job.project.id.clone();
    let request = TurnRequest {
        project: job.project,
        session_id: job.session_id,
        user_message: sanitized.sanitized,
        system_prompt: assembled.system_prompt,
        prompt_snapshot: assembled.snapshot,
        history,
        per_run_budget_usd: job.per_run_budget_usd,
        max_turns_override: job.max_turns_override,
        cancel,
        events: job.events,
    };

    let turn_span = tracing::info_span!(
        "turn",
        project_id = %project_id,
        session_id = %job.session_id,
    );
    let result = tracing::Instrument::instrument(state.runner.run(provider, request), turn_span).await;

    if registered {
        state.cancel_map.remove(job.session_id);
    }
    result
}

/// Convert a session's stored messages into provider-facing history.
/// System messages are excluded — the composed prompt travels separately.
pub async fn load_history(state: &AppState, session_id: Uuid) -> Vec<Message> {
    state
        .messages
        .list_by_session(session_id)
        .await
        .into_iter()
        .filter(|m| m.role != Role::System)
        .map(stored_to_message)
        .collect()
}

fn stored_to_message(stored: StoredMessage) -> Message {
    Message {
        role: stored.role,
        content: stored.content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_domain::tool::MessageContent;

    #[test]
    fn stored_to_message_keeps_role_and_content() {
        let stored = StoredMessage::new(
            Uuid::new_v4(),
            Role::Assistant,
            MessageContent::Text("hello".into()),
        );
        let msg = stored_to_message(stored);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content.extract_all_text(), "hello");
    }
}
