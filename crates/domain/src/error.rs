//! Shared error type used across all Nexus crates.
//!
//! Every variant maps to a stable machine-readable code and an HTTP status,
//! so API handlers and trace events can surface errors uniformly.

/// Unified error for the runtime. Tool failures are captured into tool
/// results inside a turn and never surface through this type mid-loop;
/// everything else propagates with `?`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A project is missing an active prompt layer. Carries the layer type.
    #[error("no active prompt layer: {0}")]
    NoActivePrompt(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider {provider}: {message}")]
    Provider {
        provider: String,
        message: String,
        /// Transient per the failover classification (429/5xx/timeout).
        retryable: bool,
    },

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("tool not allowed: {0}")]
    ToolNotAllowed(String),

    #[error("approval denied: {0}")]
    ApprovalDenied(String),

    #[error("approval expired: {0}")]
    ApprovalExpired(String),

    #[error("MCP connection: {0}")]
    McpConnection(String),

    #[error("MCP tool execution: {0}")]
    McpToolExecution(String),

    #[error("MCP timeout: {0}")]
    McpTimeout(String),

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    /// The target exists but is not accepting work (e.g. paused webhook).
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code, suitable for API payloads and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::NoActivePrompt(_) => "NO_ACTIVE_PROMPT",
            Error::BudgetExceeded(_) => "BUDGET_EXCEEDED",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::Provider { .. } => "PROVIDER_ERROR",
            Error::ToolExecution(_) => "TOOL_EXECUTION_ERROR",
            Error::ToolNotAllowed(_) => "TOOL_NOT_ALLOWED",
            Error::ApprovalDenied(_) => "APPROVAL_DENIED",
            Error::ApprovalExpired(_) => "APPROVAL_EXPIRED",
            Error::McpConnection(_) => "MCP_CONNECTION_ERROR",
            Error::McpToolExecution(_) => "MCP_TOOL_EXECUTION_ERROR",
            Error::McpTimeout(_) => "MCP_TIMEOUT",
            Error::SecretNotFound(_) => "SECRET_NOT_FOUND",
            Error::Unavailable(_) => "UNAVAILABLE",
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status code for the API envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) | Error::SecretNotFound(_) => 404,
            Error::NoActivePrompt(_) => 409,
            Error::BudgetExceeded(_) | Error::RateLimited(_) => 429,
            Error::ApprovalDenied(_) | Error::ApprovalExpired(_) => 403,
            Error::ToolNotAllowed(_) => 403,
            Error::McpTimeout(_) => 504,
            Error::Unavailable(_) => 503,
            Error::Provider { .. }
            | Error::ToolExecution(_)
            | Error::McpConnection(_)
            | Error::McpToolExecution(_) => 502,
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => 500,
        }
    }

    /// Whether a provider error should be retried per the failover rules.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Provider { retryable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(Error::BudgetExceeded("x".into()).code(), "BUDGET_EXCEEDED");
        assert_eq!(Error::NoActivePrompt("safety".into()).code(), "NO_ACTIVE_PROMPT");
        assert_eq!(Error::SecretNotFound("k".into()).code(), "SECRET_NOT_FOUND");
    }

    #[test]
    fn status_codes_map_to_http() {
        assert_eq!(Error::Validation("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::BudgetExceeded("x".into()).status_code(), 429);
        assert_eq!(Error::RateLimited("x".into()).status_code(), 429);
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn retryable_only_for_transient_provider_errors() {
        let transient = Error::Provider {
            provider: "anthropic".into(),
            message: "overloaded".into(),
            retryable: true,
        };
        let terminal = Error::Provider {
            provider: "anthropic".into(),
            message: "invalid request".into(),
            retryable: false,
        };
        assert!(transient.is_retryable());
        assert!(!terminal.is_retryable());
        assert!(!Error::RateLimited("x".into()).is_retryable());
    }
}
