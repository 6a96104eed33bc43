//! Error types for the `kimai-mcp` binary.

use kimai_mcp_tools::ToolError;
use rmcp::service::ServerInitializeError;
use std::process::ExitCode;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Credentials or endpoint could not be resolved. The server never starts serving.
    #[error("{0}")]
    Config(ToolError),

    /// The client closed stdio or sent something other than `initialize` first.
    #[error("mcp handshake failed: {0}")]
    Handshake(#[from] ServerInitializeError),

    #[error("mcp service task failed: {0}")]
    Service(#[from] JoinError),
}

impl ServerError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::from(2),
            Self::Handshake(_) | Self::Service(_) => ExitCode::FAILURE,
        }
    }
}

impl From<ToolError> for ServerError {
    fn from(e: ToolError) -> Self {
        Self::Config(e)
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
