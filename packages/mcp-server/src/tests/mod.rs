


#[cfg(test)]
pub mod test_helpers {
    use crate::context::ToolContext;
    use crate::server::McpServer;
    use crate::tools::{register_builtin_tools, ToolRegistry};
    use async_trait::async_trait;
    use pyexec_sandbox::{RawOutcome, Sandbox, SandboxCommand, SandboxSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Sandbox that answers every run with a canned outcome after an optional delay
    pub struct StaticSandbox {
        pub code: i32,
        pub stdout: String,
        pub stderr: String,
        pub delay: Duration,
        pub runs: AtomicUsize,
    }

    impl StaticSandbox {
        pub fn printing(stdout: &str) -> Arc<Self> {
            Arc::new(Self {
                code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
                delay: Duration::ZERO,
                runs: AtomicUsize::new(0),
            })
        }

        pub fn failing(code: i32, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
                delay: Duration::ZERO,
                runs: AtomicUsize::new(0),
            })
        }

        pub fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                code: 0,
                stdout: "done\n".to_string(),
                stderr: String::new(),
                delay,
                runs: AtomicUsize::new(0),
            })
        }

        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sandbox for StaticSandbox {
        async fn run(&self, _command: &SandboxCommand) -> RawOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            RawOutcome::Exited {
                code: self.code,
                stdout: self.stdout.clone().into_bytes(),
                stderr: self.stderr.clone().into_bytes(),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    /// Tool context whose workspaces live under a test-owned directory
    pub fn create_test_context(root: &TempDir, sandbox: Arc<dyn Sandbox>) -> ToolContext {
        let settings = SandboxSettings::default().with_workspace_root(root.path());
        ToolContext::with_sandbox(settings, sandbox)
    }

    pub fn create_test_registry(root: &TempDir, sandbox: Arc<dyn Sandbox>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, create_test_context(root, sandbox));
        registry
    }

    pub fn create_test_server(root: &TempDir, sandbox: Arc<dyn Sandbox>) -> McpServer {
        McpServer::new(create_test_registry(root, sandbox))
    }

    pub fn workspace_count(root: &TempDir) -> usize {
        std::fs::read_dir(root.path()).unwrap().count()
    }
}
