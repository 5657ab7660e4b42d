// ABOUTME: Classification of raw process results into caller-facing outcomes
// ABOUTME: Zero exit yields stdout, anything else becomes a typed failure with a diagnostic message

use crate::error::{FailureKind, Result, SandboxError};
use serde::Serialize;

/// What the sandbox backend observed, before any interpretation
#[derive(Debug)]
pub enum RawOutcome {
    /// Process ran to completion. `code` is -1 when killed by a signal.
    /// `stderr` is only populated for non-zero exits.
    Exited {
        code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    /// Process could not be started at all
    LaunchFailed(std::io::Error),
}

impl RawOutcome {
    /// Stdout on a zero exit, otherwise the matching error
    pub fn into_stdout(self) -> Result<String> {
        match self {
            RawOutcome::Exited { code: 0, stdout, .. } => {
                Ok(String::from_utf8_lossy(&stdout).into_owned())
            }
            RawOutcome::Exited { code, stderr, .. } => Err(SandboxError::NonZeroExit {
                code,
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            }),
            RawOutcome::LaunchFailed(err) => Err(SandboxError::Launch(err)),
        }
    }
}

/// Single terminal value returned for every invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { stdout: String },
    Failure { kind: FailureKind, message: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Text returned to the caller: stdout or the failure message
    pub fn text(&self) -> &str {
        match self {
            ExecutionOutcome::Success { stdout } => stdout,
            ExecutionOutcome::Failure { message, .. } => message,
        }
    }
}

impl From<SandboxError> for ExecutionOutcome {
    fn from(err: SandboxError) -> Self {
        ExecutionOutcome::Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Result<String>> for ExecutionOutcome {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(stdout) => ExecutionOutcome::Success { stdout },
            Err(err) => err.into(),
        }
    }
}

pub fn classify(raw: RawOutcome) -> ExecutionOutcome {
    raw.into_stdout().into()
}
