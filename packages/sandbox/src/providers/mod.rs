// ABOUTME: Sandbox trait for isolated execution backends
// ABOUTME: Narrow interface the executor drives, so container runtimes can be swapped

use crate::invocation::SandboxCommand;
use crate::outcome::RawOutcome;
use async_trait::async_trait;

pub mod docker;

pub use docker::DockerCli;

/// Isolation substrate that runs one composed command to completion.
///
/// Dropping the future returned by `run` must terminate the sandboxed
/// program; the executor relies on this for deadlines and cancellation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Launch the command, wait for it, and report what happened
    async fn run(&self, command: &SandboxCommand) -> RawOutcome;

    /// Whether the backend looks usable right now
    async fn is_available(&self) -> bool;
}
