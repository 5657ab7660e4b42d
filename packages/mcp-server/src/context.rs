//! Context management for MCP server tools
//!
//! Holds the execution engine the tools call into. Production code builds
//! it from the environment; tests inject a settings/sandbox pair so no
//! container runtime is needed.

use pyexec_sandbox::{Executor, Sandbox, SandboxSettings};
use std::sync::Arc;

/// Context for tool execution that holds dependencies
#[derive(Clone)]
pub struct ToolContext {
    pub(crate) executor: Executor,
}

impl ToolContext {
    /// Context backed by the container runtime named in `settings`
    pub fn new(settings: SandboxSettings) -> Self {
        Self {
            executor: Executor::docker(settings),
        }
    }

    /// Context backed by an arbitrary sandbox implementation
    pub fn with_sandbox(settings: SandboxSettings, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            executor: Executor::new(settings, sandbox),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}
