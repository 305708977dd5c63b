//! Error taxonomy for the orchestration core
//!
//! Every failure that aborts a request is an [`AgentError`]. Application-level
//! tool faults never appear here: they travel as [`ToolResult::Failure`] data.
//!
//! [`ToolResult::Failure`]: crate::tools::ToolResult::Failure

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to launch tool server '{server}': {message}")]
    Launch { server: String, message: String },

    #[error("Handshake with tool server '{server}' failed: {message}")]
    Handshake { server: String, message: String },

    #[error("Tool server '{server}' violated the protocol: {message}")]
    ProtocolViolation { server: String, message: String },

    #[error("Channel to tool server '{server}' is closed")]
    ChannelClosed { server: String },

    #[error("Failed to stop tool server '{server}': {message}")]
    Shutdown { server: String, message: String },

    #[error("Tool '{tool}' is advertised by both '{existing}' and '{incoming}'")]
    DuplicateTool {
        tool: String,
        existing: String,
        incoming: String,
    },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool loop exceeded {limit} iterations")]
    ToolLoopExceeded { limit: usize },

    #[error("Routing failed: {message}")]
    Routing { message: String, raw: Option<String> },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Launch { .. } => ErrorKind::LaunchError,
            AgentError::Handshake { .. } => ErrorKind::HandshakeError,
            AgentError::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
            AgentError::ChannelClosed { .. } => ErrorKind::ChannelClosed,
            AgentError::Shutdown { .. } => ErrorKind::ShutdownError,
            AgentError::DuplicateTool { .. } => ErrorKind::DuplicateTool,
            AgentError::UnknownTool(_) => ErrorKind::UnknownTool,
            AgentError::ToolLoopExceeded { .. } => ErrorKind::ToolLoopExceeded,
            AgentError::Routing { .. } => ErrorKind::RoutingError,
            AgentError::UnknownAgent(_) => ErrorKind::UnknownAgent,
            AgentError::Completion(_) => ErrorKind::CompletionError,
            AgentError::Timeout(_) => ErrorKind::Timeout,
            AgentError::Config(_) => ErrorKind::ConfigError,
        }
    }

    pub(crate) fn routing(message: impl Into<String>, raw: Option<String>) -> Self {
        AgentError::Routing {
            message: message.into(),
            raw,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Completion(err.to_string())
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::Config(err.to_string())
    }
}

/// Machine-readable error kind, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LaunchError,
    HandshakeError,
    ProtocolViolation,
    ChannelClosed,
    ShutdownError,
    /// Never raised as an `AgentError`; tags a `ToolResult::Failure`, which
    /// travels to the model as data
    ToolFault,
    DuplicateTool,
    UnknownTool,
    ToolLoopExceeded,
    RoutingError,
    UnknownAgent,
    CompletionError,
    Timeout,
    ConfigError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&text)
    }
}

/// Structured failure returned by the external entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AgentError> for ErrorResponse {
    fn from(err: &AgentError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<AgentError> for ErrorResponse {
    fn from(err: AgentError) -> Self {
        ErrorResponse::from(&err)
    }
}
