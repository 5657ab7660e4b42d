// ABOUTME: Docker CLI sandbox backend for ephemeral script containers
// ABOUTME: Runs `docker run --rm` as a child process and force-removes containers that are abandoned

use super::Sandbox;
use crate::invocation::SandboxCommand;
use crate::outcome::RawOutcome;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Sandbox backed by a Docker-compatible CLI (`docker`, `podman`, ...)
#[derive(Debug, Clone)]
pub struct DockerCli {
    runtime: String,
}

impl DockerCli {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(crate::settings::DEFAULT_RUNTIME)
    }
}

#[async_trait]
impl Sandbox for DockerCli {
    async fn run(&self, command: &SandboxCommand) -> RawOutcome {
        debug!("Launching {} {}", command.runtime, command.args().join(" "));

        let child = Command::new(&command.runtime)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch {}: {}", command.runtime, e);
                return RawOutcome::LaunchFailed(e);
            }
        };

        // Armed until the client process reports back; if this future is
        // dropped first, the container outlives the killed client.
        let mut guard = ContainerGuard::new(&command.runtime, &command.name);
        let output = child.wait_with_output().await;
        guard.disarm();

        match output {
            Ok(output) => {
                let code = output.status.code().unwrap_or(-1);
                info!("Container {} exited with code {}", command.name, code);
                RawOutcome::Exited {
                    code,
                    stdout: output.stdout,
                    stderr: if output.status.success() {
                        Vec::new()
                    } else {
                        output.stderr
                    },
                }
            }
            Err(e) => RawOutcome::LaunchFailed(e),
        }
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.runtime)
            .arg("info")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Force-removes a named container when dropped while still armed
struct ContainerGuard {
    runtime: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(runtime: &str, name: &str) -> Self {
        Self {
            runtime: runtime.to_string(),
            name: name.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!("Run abandoned, force-removing container {}", self.name);
        let mut cmd = Command::new(&self.runtime);
        cmd.args(["rm", "-f", self.name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let name = self.name.clone();
                handle.spawn(async move {
                    if let Err(e) = cmd.status().await {
                        warn!("Failed to remove container {}: {}", name, e);
                    }
                });
            }
            Err(_) => {
                // No runtime to reap the child; fire and forget
                let _ = std::process::Command::new(&self.runtime)
                    .args(["rm", "-f", self.name.as_str()])
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn();
            }
        }
    }
}
