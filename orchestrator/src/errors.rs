//! Error types for the deckhand orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing or invalid configuration. Always raised before any side
    /// effect on the running stack.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dump or compression failure. Raised before the stack is mutated.
    #[error("Backup error: {0}")]
    Backup(String),

    /// A service ended up unhealthy, exited, or never became ready. The
    /// stack is left as-is for inspection.
    #[error("Deployment error: {0}")]
    Deploy(String),

    /// Container runtime invocation failure outside the deploy pipeline.
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Process exit code when this error aborts a command.
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestratorError::Config(_) => 2,
            OrchestratorError::Backup(_) => 3,
            OrchestratorError::Deploy(_) => 4,
            _ => 1,
        }
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
