// ABOUTME: Engine settings for the sandbox runtime, image and deadline
// ABOUTME: Loaded from environment variables with defaults for the pinned Playwright image

use pyexec_config::constants::{
    PYEXEC_CONTAINER_RUNTIME, PYEXEC_IMAGE, PYEXEC_TIMEOUT_SECS, PYEXEC_WORKSPACE_ROOT,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Pinned image bundling the Python interpreter and a headless browser toolkit
pub const DEFAULT_IMAGE: &str = "mcr.microsoft.com/playwright/python:v1.49.1-noble";
pub const DEFAULT_RUNTIME: &str = "docker";
pub const DEFAULT_MOUNT_PATH: &str = "/app";
pub const DEFAULT_INTERPRETER: &str = "python";
pub const DEFAULT_PACKAGE_MANAGER: &str = "pip";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Invalid timeout value '{0}': expected a whole number of seconds")]
    InvalidTimeout(String),
    #[error("{0} must not be empty")]
    EmptyValue(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Container runtime binary (docker, podman, ...)
    pub runtime: String,
    pub image: String,
    /// Where the workspace is bind-mounted inside the container
    pub mount_path: String,
    pub interpreter: String,
    pub package_manager: String,
    /// Deadline for a single run; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
    /// Parent directory for workspaces; `None` uses the OS temp dir
    pub workspace_root: Option<PathBuf>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            mount_path: DEFAULT_MOUNT_PATH.to_string(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
            timeout_secs: None,
            workspace_root: None,
        }
    }
}

impl SandboxSettings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(runtime) = lookup(PYEXEC_CONTAINER_RUNTIME) {
            settings.runtime = non_empty(runtime, PYEXEC_CONTAINER_RUNTIME)?;
        }

        if let Some(image) = lookup(PYEXEC_IMAGE) {
            settings.image = non_empty(image, PYEXEC_IMAGE)?;
        }

        if let Some(raw) = lookup(PYEXEC_TIMEOUT_SECS) {
            settings.timeout_secs = parse_timeout(&raw)?;
        }

        if let Some(root) = lookup(PYEXEC_WORKSPACE_ROOT) {
            let root = root.trim();
            if !root.is_empty() {
                settings.workspace_root = Some(PathBuf::from(root));
            }
        }

        Ok(settings)
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs.filter(|secs| *secs > 0);
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// In-container path of the materialized script
    pub fn script_path(&self, script_name: &str) -> String {
        format!("{}/{}", self.mount_path.trim_end_matches('/'), script_name)
    }
}

fn non_empty(value: String, name: &'static str) -> Result<String, SettingsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SettingsError::EmptyValue(name));
    }
    Ok(trimmed.to_string())
}

/// `0` and empty strings disable the deadline
pub fn parse_timeout(raw: &str) -> Result<Option<u64>, SettingsError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let secs = raw
        .parse::<u64>()
        .map_err(|_| SettingsError::InvalidTimeout(raw.to_string()))?;
    Ok(Some(secs).filter(|secs| *secs > 0))
}
