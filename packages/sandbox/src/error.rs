// ABOUTME: Error types for sandboxed script execution
// ABOUTME: Every failure maps onto one of the three caller-visible failure kinds

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-visible classification of a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed or missing input, detected before any workspace exists
    InvalidRequest,
    /// Local workspace allocation or script write failed
    WorkspaceError,
    /// Sandbox could not be launched, exited non-zero, or ran past its deadline
    ExecutionError,
}

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Request rejected before any resource was acquired
    #[error("{0}")]
    InvalidRequest(String),

    /// Workspace directory could not be created
    #[error("Failed to create temp dir: {0}")]
    WorkspaceCreate(#[source] std::io::Error),

    /// Script could not be written into the workspace
    #[error("Failed to write script to file: {0}")]
    ScriptWrite(#[source] std::io::Error),

    /// Container runtime could not be started at all
    #[error("Execution failed: {0}")]
    Launch(#[source] std::io::Error),

    /// Sandboxed program (or its dependency install step) exited non-zero
    #[error("Python exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    /// Run exceeded the configured deadline and was killed
    #[error("Execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl SandboxError {
    pub fn missing_code() -> Self {
        SandboxError::InvalidRequest("Missing or invalid code argument".to_string())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SandboxError::InvalidRequest(_) => FailureKind::InvalidRequest,
            SandboxError::WorkspaceCreate(_) | SandboxError::ScriptWrite(_) => {
                FailureKind::WorkspaceError
            }
            SandboxError::Launch(_)
            | SandboxError::NonZeroExit { .. }
            | SandboxError::Timeout { .. } => FailureKind::ExecutionError,
        }
    }
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
