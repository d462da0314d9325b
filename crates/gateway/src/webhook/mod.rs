//! Webhook processing — validation, template expansion, agent dispatch.
//!
//! Validation order: existence (404) → paused (503) → source IP (403) →
//! HMAC signature (401). The signature is HMAC-SHA256 over the raw
//! request body with the secret resolved from the webhook's env var,
//! compared in constant time.

pub mod queue;
pub mod template;

use std::time::Instant;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use nexus_domain::error::{Error, Result};
use nexus_domain::session::Session;
use nexus_domain::webhook::{Webhook, WebhookEvent, WebhookStatus};

use crate::runtime::{execute_turn, TurnJob};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Headers checked for the signature, in order.
const SIGNATURE_HEADERS: &[&str] = &["x-webhook-signature", "x-hub-signature-256", "x-signature"];

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRunResult {
    pub success: bool,
    pub session_id: uuid::Uuid,
    pub trace_id: uuid::Uuid,
    pub response: String,
    pub duration_ms: u64,
}

/// Process one inbound delivery synchronously: validate, expand the
/// trigger prompt, create a session, and run the agent.
pub async fn process(state: &AppState, event: WebhookEvent) -> Result<WebhookRunResult> {
    let webhook = state.webhooks.get(event.webhook_id).await?;
    validate(&webhook, &event)?;
    run(state, &webhook, event).await
}

/// Expand the trigger prompt and run the agent. Validation is the
/// caller's responsibility (the test endpoint skips it deliberately).
pub async fn run(
    state: &AppState,
    webhook: &Webhook,
    event: WebhookEvent,
) -> Result<WebhookRunResult> {
    let started = Instant::now();
    let prompt = template::expand(&webhook.trigger_prompt, &event.payload);

    let project = state.projects.get(&webhook.project_id).await?;
    let session = state
        .sessions
        .insert(Session::new(
            &webhook.project_id,
            serde_json::json!({
                "source": "webhook",
                "webhookId": webhook.id.to_string(),
            }),
        ))
        .await;

    let outcome = execute_turn(
        state,
        TurnJob {
            project,
            session_id: session.id,
            raw_message: prompt,
            per_run_budget_usd: None,
            max_turns_override: None,
            cancel: None,
            events: None,
        },
    )
    .await?;

    Ok(WebhookRunResult {
        success: true,
        session_id: session.id,
        trace_id: outcome.trace.id,
        response: outcome.response_text,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

/// Reject paused webhooks, disallowed source IPs, and bad signatures.
pub fn validate(webhook: &Webhook, event: &WebhookEvent) -> Result<()> {
    if webhook.status == WebhookStatus::Paused {
        return Err(Error::Unavailable(format!("webhook '{}' is paused", webhook.name)));
    }

    if !webhook.allowed_ips.is_empty() {
        let source = event.source_ip.as_deref().unwrap_or("");
        if !webhook.allowed_ips.iter().any(|ip| ip == source) {
            return Err(Error::Forbidden(format!(
                "source ip '{source}' is not in the webhook allowlist"
            )));
        }
    }

    if let Some(env_var) = &webhook.secret_env_var {
        let secret = std::env::var(env_var)
            .map_err(|_| Error::Unauthorized(format!("webhook secret env var '{env_var}' unset")))?;

        let provided = SIGNATURE_HEADERS
            .iter()
            .find_map(|h| event.headers.get(*h))
            .ok_or_else(|| Error::Unauthorized("missing webhook signature header".into()))?;
        let provided = provided.strip_prefix("sha256=").unwrap_or(provided);

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(event.raw_body.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks.
        if computed.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() != 1 {
            return Err(Error::Unauthorized("invalid webhook signature".into()));
        }
    }

    Ok(())
}
