// ABOUTME: Invocation executor tying workspace, command composition, sandbox run and classification together
// ABOUTME: Parses tool arguments and guarantees workspace cleanup on every exit path

use crate::error::{Result, SandboxError};
use crate::invocation;
use crate::outcome::ExecutionOutcome;
use crate::providers::{DockerCli, Sandbox};
use crate::settings::SandboxSettings;
use crate::workspace::Workspace;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One request to run a snippet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationRequest {
    pub code: String,
    pub dependencies: Vec<String>,
}

impl InvocationRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Parse tool-call arguments: `code` (required string) and
    /// `modules` / `dependencies` (optional comma-separated string)
    pub fn from_arguments(arguments: Option<&Value>) -> Result<Self> {
        let code = arguments
            .and_then(|args| args.get("code"))
            .and_then(Value::as_str)
            .ok_or_else(SandboxError::missing_code)?;

        let modules = arguments.and_then(|args| {
            args.get("modules")
                .and_then(Value::as_str)
                .or_else(|| args.get("dependencies").and_then(Value::as_str))
        });

        Ok(Self {
            code: code.to_string(),
            dependencies: parse_dependencies(modules),
        })
    }
}

/// Split a comma-separated dependency list, dropping blank entries
pub fn parse_dependencies(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|dep| !dep.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// Runs invocations against a sandbox backend. Holds no per-invocation state,
/// so one executor can serve any number of concurrent calls.
#[derive(Clone)]
pub struct Executor {
    settings: Arc<SandboxSettings>,
    sandbox: Arc<dyn Sandbox>,
}

impl Executor {
    pub fn new(settings: SandboxSettings, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            settings: Arc::new(settings),
            sandbox,
        }
    }

    /// Executor backed by the settings' container runtime CLI
    pub fn docker(settings: SandboxSettings) -> Self {
        let sandbox = Arc::new(DockerCli::new(settings.runtime.clone()));
        Self::new(settings, sandbox)
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Validate raw tool arguments and execute them
    pub async fn execute_arguments(&self, arguments: Option<&Value>) -> ExecutionOutcome {
        match InvocationRequest::from_arguments(arguments) {
            Ok(request) => self.execute(&request).await,
            Err(e) => {
                warn!("Rejected invocation: {}", e);
                e.into()
            }
        }
    }

    pub async fn execute(&self, request: &InvocationRequest) -> ExecutionOutcome {
        let started = Instant::now();
        let result = self.run_invocation(request).await;

        match &result {
            Ok(stdout) => info!(
                "Invocation succeeded in {:?} ({} bytes of output)",
                started.elapsed(),
                stdout.len()
            ),
            Err(e) => warn!("Invocation failed in {:?}: {}", started.elapsed(), e),
        }

        result.into()
    }

    async fn run_invocation(&self, request: &InvocationRequest) -> Result<String> {
        let workspace = Workspace::acquire(self.settings.workspace_root.as_deref())?;

        // If this future is dropped mid-run, the workspace is removed on drop
        let result = self.run_in(&workspace, request).await;

        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.release() {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
        }

        result
    }

    async fn run_in(&self, workspace: &Workspace, request: &InvocationRequest) -> Result<String> {
        workspace.write_script(&request.code).await?;

        let command = invocation::build(&self.settings, workspace.path(), &request.dependencies);
        debug!(
            "Running {} with {} dependencies",
            command.name,
            request.dependencies.len()
        );

        let raw = match self.settings.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.sandbox.run(&command))
                .await
                .map_err(|_| SandboxError::Timeout {
                    seconds: limit.as_secs(),
                })?,
            None => self.sandbox.run(&command).await,
        };

        raw.into_stdout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::outcome::RawOutcome;
    use crate::providers::MockSandbox;
    use crate::workspace::SCRIPT_FILENAME;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor_with(sandbox: MockSandbox, root: &TempDir) -> Executor {
        let settings = SandboxSettings::default().with_workspace_root(root.path());
        Executor::new(settings, Arc::new(sandbox))
    }

    fn assert_root_empty(root: &TempDir) {
        let leftovers: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "workspace left behind: {:?}", leftovers);
    }

    #[rstest]
    #[case(Some("a,b,c"), vec!["a", "b", "c"])]
    #[case(Some(""), vec![])]
    #[case(None, vec![])]
    #[case(Some("requests, bs4 ,"), vec!["requests", "bs4"])]
    #[case(Some(",,"), vec![])]
    fn test_parse_dependencies(#[case] raw: Option<&str>, #[case] expected: Vec<&str>) {
        assert_eq!(parse_dependencies(raw), expected);
    }

    #[test]
    fn test_from_arguments() {
        let args = json!({"code": "print(1)", "modules": "numpy,pandas"});
        let request = InvocationRequest::from_arguments(Some(&args)).unwrap();
        assert_eq!(
            request,
            InvocationRequest::new("print(1)").with_dependencies(["numpy", "pandas"])
        );

        let alias = json!({"code": "print(1)", "dependencies": "httpx"});
        let request = InvocationRequest::from_arguments(Some(&alias)).unwrap();
        assert_eq!(request.dependencies, vec!["httpx"]);
    }

    #[rstest]
    #[case(json!({"code": "x", "modules": null, "dependencies": "httpx"}), vec!["httpx"])]
    #[case(json!({"code": "x", "modules": 3, "dependencies": "httpx"}), vec!["httpx"])]
    #[case(json!({"code": "x", "modules": "bs4", "dependencies": "httpx"}), vec!["bs4"])]
    fn test_dependencies_alias_used_when_modules_not_a_string(
        #[case] args: Value,
        #[case] expected: Vec<&str>,
    ) {
        let request = InvocationRequest::from_arguments(Some(&args)).unwrap();
        assert_eq!(request.dependencies, expected);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(json!({})))]
    #[case(Some(json!({"code": 42})))]
    #[case(Some(json!({"modules": "requests"})))]
    fn test_from_arguments_rejects_missing_code(#[case] args: Option<Value>) {
        let err = InvocationRequest::from_arguments(args.as_ref()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_success_returns_stdout_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().times(1).returning(|command| {
            let host = &command.mounts[0].host_path;
            assert_eq!(
                std::fs::read_to_string(host.join(SCRIPT_FILENAME)).unwrap(),
                "print(\"hi\")"
            );
            assert_eq!(command.shell_command, "python /app/script.py");
            RawOutcome::Exited {
                code: 0,
                stdout: b"hi\n".to_vec(),
                stderr: Vec::new(),
            }
        });

        let executor = executor_with(sandbox, &root);
        let outcome = executor
            .execute(&InvocationRequest::new("print(\"hi\")"))
            .await;

        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stdout: "hi\n".to_string()
            }
        );
        assert_root_empty(&root);
    }

    #[tokio::test]
    async fn test_non_zero_exit_cleans_up() {
        let root = TempDir::new().unwrap();
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|_| RawOutcome::Exited {
            code: 1,
            stdout: Vec::new(),
            stderr: b"ValueError: x".to_vec(),
        });

        let executor = executor_with(sandbox, &root);
        let outcome = executor
            .execute(&InvocationRequest::new("raise ValueError(\"x\")"))
            .await;

        assert_eq!(outcome.kind(), Some(FailureKind::ExecutionError));
        assert_eq!(outcome.text(), "Python exited with code 1: ValueError: x");
        assert_root_empty(&root);
    }

    #[tokio::test]
    async fn test_launch_failure_cleans_up() {
        let root = TempDir::new().unwrap();
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|_| {
            RawOutcome::LaunchFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "docker not found",
            ))
        });

        let executor = executor_with(sandbox, &root);
        let outcome = executor.execute(&InvocationRequest::new("print(1)")).await;

        assert_eq!(outcome.text(), "Execution failed: docker not found");
        assert_root_empty(&root);
    }

    #[tokio::test]
    async fn test_missing_code_never_reaches_sandbox() {
        let root = TempDir::new().unwrap();
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().never();

        let executor = executor_with(sandbox, &root);
        let outcome = executor.execute_arguments(Some(&json!({}))).await;

        assert_eq!(outcome.kind(), Some(FailureKind::InvalidRequest));
        assert_eq!(outcome.text(), "Missing or invalid code argument");
        assert_root_empty(&root);
    }

    #[tokio::test]
    async fn test_dependencies_reach_command() {
        let root = TempDir::new().unwrap();
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|command| {
            assert_eq!(
                command.shell_command,
                "python -m pip install --quiet not-a-real-package-xyz && python /app/script.py"
            );
            RawOutcome::Exited {
                code: 1,
                stdout: Vec::new(),
                stderr: b"ERROR: No matching distribution found".to_vec(),
            }
        });

        let executor = executor_with(sandbox, &root);
        let outcome = executor
            .execute_arguments(Some(&json!({
                "code": "print(\"unreachable\")",
                "modules": "not-a-real-package-xyz"
            })))
            .await;

        assert_eq!(outcome.kind(), Some(FailureKind::ExecutionError));
        assert!(!outcome.text().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_unwritable_root_is_workspace_error() {
        let root = TempDir::new().unwrap();
        let settings =
            SandboxSettings::default().with_workspace_root(root.path().join("missing"));
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().never();

        let executor = Executor::new(settings, Arc::new(sandbox));
        let outcome = executor.execute(&InvocationRequest::new("print(1)")).await;

        assert_eq!(outcome.kind(), Some(FailureKind::WorkspaceError));
        assert!(outcome.text().starts_with("Failed to create temp dir"));
    }
}
