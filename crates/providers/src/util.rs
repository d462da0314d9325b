//! Shared utility functions for provider adapters.

use nexus_domain::error::{Error, Result};
use nexus_domain::tool::Message;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeouts and connection failures are retryable; everything else is
/// classified by status code where one is available.
pub(crate) fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    let retryable = e.is_timeout()
        || e.is_connect()
        || e.status().is_some_and(|s| s.as_u16() == 429 || s.is_server_error());
    Error::Provider {
        provider: provider.to_string(),
        message: e.to_string(),
        retryable,
    }
}

/// Classify a non-2xx HTTP response from a vendor API.
pub(crate) fn status_error(provider: &str, status: u16, body: &str) -> Error {
    Error::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {}", truncate(body, 300)),
        retryable: status == 429 || (500..600).contains(&status) || status == 408,
    }
}

/// Resolve an API key from the environment variable named in the provider
/// spec. The key itself never appears in config or persisted state.
pub fn resolve_api_key(env_var: &str) -> Result<String> {
    std::env::var(env_var).map_err(|_| {
        Error::Validation(format!(
            "environment variable '{env_var}' not set or not valid UTF-8"
        ))
    })
}

/// Estimate tokens for a message list (~4 chars per token, plus a small
/// per-message overhead for role framing).
pub fn estimate_tokens(messages: &[Message]) -> u32 {
    let chars: usize = messages.iter().map(|m| m.content.char_len() + 16).sum();
    (chars / 4) as u32
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        &s[..end]
    }
}
