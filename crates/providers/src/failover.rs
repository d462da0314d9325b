//! Failover — retry policy around stream establishment.
//!
//! Transient vendor failures (rate limits, 5xx, timeouts) are retried up to
//! the project's `max_retries` with exponential backoff before being
//! surfaced. Errors that occur *mid-stream* are not retried here; they
//! arrive as a terminal `error` event on the stream itself.

use std::time::Duration;

use nexus_domain::error::{Error, Result};
use nexus_domain::project::FailoverRules;
use nexus_domain::stream::{BoxStream, ChatEvent};

use crate::traits::{ChatParams, ProviderAdapter};

const BACKOFF_BASE_MS: u64 = 500;

/// Whether the failover rules allow retrying this error.
pub fn should_retry(rules: &FailoverRules, err: &Error) -> bool {
    match err {
        Error::Provider {
            retryable: true,
            message,
            ..
        } => {
            // Classify the transient error against the individually
            // toggleable rules. Rate limits are recognizable by status;
            // anything else transient falls under server-error/timeout.
            let is_rate_limit = message.contains("HTTP 429");
            let is_timeout = message.to_ascii_lowercase().contains("timed out")
                || message.to_ascii_lowercase().contains("timeout");
            if is_rate_limit {
                rules.retry_on_rate_limit
            } else if is_timeout {
                rules.retry_on_timeout
            } else {
                rules.retry_on_server_error
            }
        }
        _ => false,
    }
}

/// Open a chat stream, retrying transient failures per the failover rules.
///
/// Each attempt is also bounded by `rules.timeout_ms`.
pub async fn open_stream(
    provider: &dyn ProviderAdapter,
    params: &ChatParams,
    rules: &FailoverRules,
) -> Result<BoxStream<'static, Result<ChatEvent>>> {
    let mut attempt: u32 = 0;
    loop {
        let fut = provider.chat(params);
        let result = match tokio::time::timeout(Duration::from_millis(rules.timeout_ms), fut).await
        {
            Ok(r) => r,
            Err(_) => Err(Error::Provider {
                provider: provider.provider_id().to_string(),
                message: format!("request timed out after {}ms", rules.timeout_ms),
                retryable: true,
            }),
        };

        match result {
            Ok(stream) => return Ok(stream),
            Err(err) if attempt < rules.max_retries && should_retry(rules, &err) => {
                let backoff = Duration::from_millis(BACKOFF_BASE_MS << attempt.min(6));
                tracing::warn!(
                    provider = provider.provider_id(),
                    attempt = attempt + 1,
                    max_retries = rules.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transient provider error, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
