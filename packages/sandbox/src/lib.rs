// ABOUTME: Execution engine for running untrusted Python snippets in throwaway containers
// ABOUTME: Workspace lifecycle, command composition, sandbox supervision and outcome classification

pub mod error;
pub mod executor;
pub mod invocation;
pub mod outcome;
pub mod providers;
pub mod settings;
pub mod workspace;

pub use error::{FailureKind, Result, SandboxError};
pub use executor::{parse_dependencies, Executor, InvocationRequest};
pub use invocation::{Mount, SandboxCommand};
pub use outcome::{classify, ExecutionOutcome, RawOutcome};
pub use providers::{DockerCli, Sandbox};
pub use settings::{SandboxSettings, SettingsError};
pub use workspace::{Workspace, SCRIPT_FILENAME};
