//! Inbound processing — contact resolution, session fan-in, agent
//! dispatch, and reply delivery.
//!
//! Partial-failure policy: agent errors surface to the caller; a failed
//! reply send is logged and never rolls back the persisted conversation.

pub mod agents;
pub mod channels;

use chrono::Utc;
use uuid::Uuid;

use nexus_domain::contact::Contact;
use nexus_domain::error::Result;
use nexus_domain::session::Session;

use crate::runtime::{execute_turn, TurnJob};
use crate::state::AppState;
use channels::{InboundMessage, OutboundMessage};

/// Outcome of processing one inbound message.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundOutcome {
    pub contact_id: Uuid,
    pub session_id: Uuid,
    pub trace_id: Uuid,
    pub response: String,
    pub reply_delivered: bool,
}

/// Process one inbound channel message end to end.
pub async fn process(state: &AppState, inbound: InboundMessage) -> Result<InboundOutcome> {
    let mut project = state.projects.get(&inbound.project_id).await?;
    // Channel traffic resolves the agent config through the TTL cache.
    project.agent_config = state.agent_cache.get(&project.id).await?;

    // 1. Resolve or create the contact for (project, channel identifier).
    let contact = resolve_contact(state, &inbound).await;

    // 2. Route to an agent (project default when the router abstains).
    let agent_id =
        state
            .agent_router
            .route(&inbound.project_id, &inbound.channel, contact.role.as_deref());

    // 3. Resolve the active session for the contact, or open one.
    let session = resolve_session(state, &inbound, &contact, agent_id.as_deref()).await;

    // 4. Run the turn with the sanitized content and history.
    let outcome = execute_turn(
        state,
        TurnJob {
            project,
            session_id: session.id,
            raw_message: inbound.content.clone(),
            per_run_budget_usd: None,
            max_turns_override: None,
            cancel: None,
            events: None,
        },
    )
    .await?;

    // 5. Dispatch the reply on the originating channel. Send failures do
    //    not roll back the conversation.
    let reply_delivered = match state.channels.resolve(&inbound.project_id, &inbound.channel) {
        Ok(adapter) => {
            let send_result = adapter
                .send(OutboundMessage {
                    project_id: inbound.project_id.clone(),
                    channel: inbound.channel.clone(),
                    recipient_identifier: inbound.sender_identifier.clone(),
                    text: outcome.response_text.clone(),
                    reply_to_channel_message_id: Some(inbound.channel_message_id.clone()),
                })
                .await;
            match send_result {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        project_id = %inbound.project_id,
                        channel = %inbound.channel,
                        error = %e,
                        "reply delivery failed"
                    );
                    false
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                project_id = %inbound.project_id,
                channel = %inbound.channel,
                error = %e,
                "no channel adapter for reply"
            );
            false
        }
    };

    Ok(InboundOutcome {
        contact_id: contact.id,
        session_id: session.id,
        trace_id: outcome.trace.id,
        response: outcome.response_text,
        reply_delivered,
    })
}

async fn resolve_contact(state: &AppState, inbound: &InboundMessage) -> Contact {
    if let Some(existing) = state
        .contacts
        .find_by_identifier(&inbound.project_id, &inbound.sender_identifier)
        .await
    {
        return existing;
    }

    let contact = Contact {
        id: Uuid::new_v4(),
        project_id: inbound.project_id.clone(),
        phone: inbound
            .sender_identifier
            .starts_with('+')
            .then(|| inbound.sender_identifier.clone()),
        email: inbound
            .sender_identifier
            .contains('@')
            .then(|| inbound.sender_identifier.clone()),
        external_id: (!inbound.sender_identifier.starts_with('+')
            && !inbound.sender_identifier.contains('@'))
        .then(|| inbound.sender_identifier.clone()),
        name: inbound.sender_name.clone(),
        language: None,
        role: None,
        metadata: None,
        created_at: Utc::now(),
    };
    tracing::info!(
        project_id = %inbound.project_id,
        channel = %inbound.channel,
        contact_id = %contact.id,
        "new contact"
    );
    state.contacts.insert(contact).await
}

async fn resolve_session(
    state: &AppState,
    inbound: &InboundMessage,
    contact: &Contact,
    agent_id: Option<&str>,
) -> Session {
    if let Some(session) = state
        .sessions
        .find_active_for_contact(&inbound.project_id, contact.id)
        .await
    {
        return session;
    }

    let mut metadata = serde_json::json!({
        "contactId": contact.id.to_string(),
        "channel": inbound.channel,
    });
    if let Some(agent_id) = agent_id {
        metadata["agentId"] = serde_json::Value::String(agent_id.to_string());
    }
    let session = Session::new(&inbound.project_id, metadata);
    tracing::info!(
        project_id = %inbound.project_id,
        session_id = %session.id,
        contact_id = %contact.id,
        "new session for contact"
    );
    state.sessions.insert(session).await
}
