//! Error types for `kimai-mcp-tools`.
//!
//! The `Display` output of every variant is what a caller sees as the tool's `errorMessage`,
//! so the wording here is part of the tool contract.

use thiserror::Error;

/// Every failure a tool call can produce below the dispatcher boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Startup configuration is missing or invalid. Fatal before serving.
    #[error("config error: {0}")]
    Config(String),

    /// The upstream rejected the credentials (401/403). Never retried.
    #[error("auth error: upstream rejected credentials ({status}): {body}")]
    Auth { status: u16, body: String },

    /// Network failure, timeout or upstream 5xx.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a 4xx (other than auth) or an undecodable success body.
    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// The upstream payload did not match any known shape for the expected entity.
    #[error("normalization error: {0}")]
    Normalization(String),

    /// Caller-supplied arguments are invalid. Raised before any network call.
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn invalid(name: impl Into<String>) -> Self {
        Self::Validation(name.into())
    }

    /// Whether the HTTP client adapter may retry an idempotent request after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type alias for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::ToolError;

    #[test]
    fn auth_message_mentions_auth() {
        let e = ToolError::Auth {
            status: 401,
            body: "{\"message\":\"Unauthorized\"}".to_string(),
        };
        assert!(e.to_string().contains("auth"));
        assert!(e.to_string().contains("401"));
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(ToolError::Transport("timeout".into()).is_retryable());
        assert!(
            !ToolError::Upstream {
                status: 404,
                body: "not found".into()
            }
            .is_retryable()
        );
        assert!(
            !ToolError::Auth {
                status: 403,
                body: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn validation_message_names_the_argument() {
        assert_eq!(ToolError::invalid("id").to_string(), "invalid argument: id");
    }
}
