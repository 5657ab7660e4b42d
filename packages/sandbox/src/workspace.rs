// ABOUTME: Ephemeral per-invocation workspace directories
// ABOUTME: Creates a uniquely named directory, materializes the script, and removes it on release or drop

use crate::error::{Result, SandboxError};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Directory name prefix for every workspace
pub const WORKSPACE_PREFIX: &str = "python_repl";

/// Fixed name of the materialized script inside a workspace
pub const SCRIPT_FILENAME: &str = "script.py";

/// Invocation-scoped directory holding exactly one script.
///
/// The directory is removed by [`Workspace::release`]. A workspace that is
/// dropped without being released (panic, aborted task) is removed on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh, uniquely named workspace under `root` (or the OS temp dir)
    pub fn acquire(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(SandboxError::WorkspaceCreate)?;

        let path = dir.path().to_path_buf();
        debug!(workspace = %path.display(), "Workspace acquired");

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Host path of the script file
    pub fn script_path(&self) -> PathBuf {
        self.path.join(SCRIPT_FILENAME)
    }

    /// Write `code` verbatim into the workspace script file
    pub async fn write_script(&self, code: &str) -> Result<PathBuf> {
        let script = self.script_path();
        tokio::fs::write(&script, code.as_bytes())
            .await
            .map_err(SandboxError::ScriptWrite)?;
        debug!(script = %script.display(), bytes = code.len(), "Script materialized");
        Ok(script)
    }

    /// Remove the workspace directory and everything in it
    pub fn release(mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => {
                let result = dir.close();
                debug!(workspace = %self.path.display(), ok = result.is_ok(), "Workspace released");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // TempDir's own drop does the removal
        if self.dir.is_some() {
            warn!(
                workspace = %self.path.display(),
                "Workspace dropped without release, removing"
            );
        }
    }
}
