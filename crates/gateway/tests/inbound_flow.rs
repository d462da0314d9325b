//! Channel fan-in and webhook trigger scenarios.

mod common;

use std::collections::HashMap;

use chrono::Utc;
use common::*;
use nexus_domain::webhook::{Webhook, WebhookEvent, WebhookStatus};
use nexus_gateway::inbound;
use nexus_gateway::inbound::channels::IntegrationConfig;
use nexus_gateway::webhook;
use uuid::Uuid;

#[tokio::test]
async fn inbound_message_creates_contact_session_and_reply() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    state.projects.insert(test_project("P1", vec![])).await.unwrap();
    seed_layers(&state, "P1").await;

    state.channels.upsert(IntegrationConfig {
        id: Uuid::new_v4(),
        project_id: "P1".into(),
        channel: "whatsapp".into(),
        kind: "log".into(),
        delivery_url: None,
    });

    let provider = ScriptedProvider::new(vec![
        text_reply("Hi Ada!", 30, 5),
        text_reply("Still here.", 30, 5),
    ]);
    state.providers.register_custom(&test_provider_spec(), provider);

    let adapter = state.channels.resolve("P1", "whatsapp").unwrap();
    let first = adapter
        .parse_inbound(
            "P1",
            &serde_json::json!({
                "messageId": "wamid.1",
                "sender": "+15550001",
                "senderName": "Ada",
                "text": "hello",
            }),
        )
        .unwrap();

    let outcome = inbound::process(&state, first).await.unwrap();
    assert_eq!(outcome.response, "Hi Ada!");
    assert!(outcome.reply_delivered);

    // Contact and session exist and are linked.
    let contact = state.contacts.get(outcome.contact_id).await.unwrap();
    assert_eq!(contact.phone.as_deref(), Some("+15550001"));
    assert_eq!(contact.name.as_deref(), Some("Ada"));
    let session = state.sessions.get(outcome.session_id).await.unwrap();
    assert_eq!(
        session.metadata.get("contactId").and_then(|v| v.as_str()),
        Some(outcome.contact_id.to_string().as_str())
    );

    // A second message from the same sender reuses both.
    let second = adapter
        .parse_inbound(
            "P1",
            &serde_json::json!({
                "messageId": "wamid.2",
                "sender": "+15550001",
                "text": "are you there?",
            }),
        )
        .unwrap();
    let outcome2 = inbound::process(&state, second).await.unwrap();
    assert_eq!(outcome2.contact_id, outcome.contact_id);
    assert_eq!(outcome2.session_id, outcome.session_id);

    // Four messages in the shared session: two turns.
    assert_eq!(state.messages.count_for_session(outcome.session_id).await, 4);
}

#[tokio::test]
async fn webhook_trigger_expands_template_and_runs() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    state.projects.insert(test_project("P1", vec![])).await.unwrap();
    seed_layers(&state, "P1").await;

    let provider = ScriptedProvider::new(vec![text_reply("Noted the deployment.", 25, 6)]);
    state.providers.register_custom(&test_provider_spec(), provider);

    let now = Utc::now();
    let hook = state
        .webhooks
        .insert(Webhook {
            id: Uuid::new_v4(),
            project_id: "P1".into(),
            agent_id: None,
            name: "deploys".into(),
            trigger_prompt: "Deployment {{status}} for {{repo.name}}".into(),
            secret_env_var: None,
            allowed_ips: vec![],
            status: WebhookStatus::Active,
            created_at: now,
            updated_at: now,
        })
        .await;

    let raw_body = r#"{"status":"success","repo":{"name":"nexus"}}"#;
    let result = webhook::process(
        &state,
        WebhookEvent {
            webhook_id: hook.id,
            payload: serde_json::from_str(raw_body).unwrap(),
            headers: HashMap::new(),
            raw_body: raw_body.into(),
            source_ip: None,
            received_at: Utc::now(),
        },
    )
    .await
    .unwrap();

    assert!(result.success);
    assert_eq!(result.response, "Noted the deployment.");

    // The session carries webhook provenance, and the expanded template
    // became the user message.
    let session = state.sessions.get(result.session_id).await.unwrap();
    assert_eq!(
        session.metadata.get("source").and_then(|v| v.as_str()),
        Some("webhook")
    );
    let messages = state.messages.list_by_session(result.session_id).await;
    assert_eq!(
        messages[0].content.extract_all_text(),
        "Deployment success for nexus"
    );
}

#[tokio::test]
async fn unknown_webhook_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;

    let err = webhook::process(
        &state,
        WebhookEvent {
            webhook_id: Uuid::new_v4(),
            payload: serde_json::json!({}),
            headers: HashMap::new(),
            raw_body: "{}".into(),
            source_ip: None,
            received_at: Utc::now(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), 404);
}
