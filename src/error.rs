//! Error types for the routing engine and its collaborators.
//!
//! Only [`RouterError`] terminates a request. Agent, generator and store
//! failures are isolated per agent and surface as diagnostics.

use crate::models::AgentFailure;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of the text-generation collaborator.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("cannot connect to text generator at {url}")]
    Connection { url: String },

    #[error("text generator rate limited the request")]
    RateLimited,

    #[error("text generator API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse generator response: {0}")]
    Parse(String),
}

/// Failure of the knowledge-store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read knowledge file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse knowledge file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unknown knowledge namespace: {0}")]
    UnknownNamespace(String),
}

/// Failure of a single agent call. Never fatal for the request.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("agent '{agent}' timed out after {seconds}s")]
    Timeout { agent: String, seconds: u64 },

    #[error("agent '{agent}' has no registered capability")]
    Unavailable { agent: String },

    #[error("agent '{agent}' upstream failure: {message}")]
    Upstream { agent: String, message: String },

    #[error("agent '{agent}' generation failed: {source}")]
    Generation {
        agent: String,
        #[source]
        source: GenerationError,
    },

    #[error("agent '{agent}' aborted: {message}")]
    Aborted { agent: String, message: String },
}

impl AgentError {
    /// Id of the agent this error belongs to.
    pub fn agent(&self) -> &str {
        match self {
            AgentError::Timeout { agent, .. }
            | AgentError::Unavailable { agent }
            | AgentError::Upstream { agent, .. }
            | AgentError::Generation { agent, .. }
            | AgentError::Aborted { agent, .. } => agent,
        }
    }
}

/// Request-level failure.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("query cannot be empty")]
    EmptyQuery,

    #[error("query exceeds maximum length ({len} bytes, max {max})")]
    QueryTooLong { len: usize, max: usize },

    #[error("no data found: all {attempted} selected agent(s) failed")]
    NoData {
        attempted: usize,
        failures: Vec<AgentFailure>,
    },

    #[error("query was cancelled")]
    Cancelled,
}
