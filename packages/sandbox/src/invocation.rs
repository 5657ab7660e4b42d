// ABOUTME: Composition of the container command for a single invocation
// ABOUTME: Mounts the workspace, pins the image, and chains the dependency install before the script run

use crate::settings::SandboxSettings;
use crate::workspace::SCRIPT_FILENAME;
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Prefix of every container name
pub const CONTAINER_NAME_PREFIX: &str = "pyexec";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
}

impl Mount {
    /// `host:container` form accepted by `-v`
    pub fn volume_arg(&self) -> String {
        format!("{}:{}", self.host_path.display(), self.container_path)
    }
}

/// Fully composed container launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxCommand {
    pub runtime: String,
    /// Unique container name, used to force-remove an abandoned run
    pub name: String,
    pub image: String,
    pub mounts: Vec<Mount>,
    /// Single `sh -c` payload run inside the container
    pub shell_command: String,
}

impl SandboxCommand {
    /// Arguments passed to the runtime binary
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];
        for mount in &self.mounts {
            args.push("-v".to_string());
            args.push(mount.volume_arg());
        }
        args.push(self.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(self.shell_command.clone());
        args
    }
}

/// Build the command for a workspace, generating a fresh container name
pub fn build(
    settings: &SandboxSettings,
    workspace_dir: &Path,
    dependencies: &[String],
) -> SandboxCommand {
    let name = format!("{}-{}", CONTAINER_NAME_PREFIX, Uuid::new_v4());
    build_named(settings, workspace_dir, dependencies, name)
}

/// Deterministic composition given every input, including the container name
pub fn build_named(
    settings: &SandboxSettings,
    workspace_dir: &Path,
    dependencies: &[String],
    name: String,
) -> SandboxCommand {
    SandboxCommand {
        runtime: settings.runtime.clone(),
        name,
        image: settings.image.clone(),
        mounts: vec![Mount {
            host_path: workspace_dir.to_path_buf(),
            container_path: settings.mount_path.clone(),
        }],
        shell_command: shell_command(settings, dependencies),
    }
}

/// `[<py> -m <pm> install --quiet <deps...> &&] <py> <script>`
pub fn shell_command(settings: &SandboxSettings, dependencies: &[String]) -> String {
    let mut parts: Vec<Cow<'_, str>> = Vec::new();

    if !dependencies.is_empty() {
        parts.push(Cow::Borrowed(settings.interpreter.as_str()));
        parts.push(Cow::Borrowed("-m"));
        parts.push(Cow::Borrowed(settings.package_manager.as_str()));
        parts.push(Cow::Borrowed("install"));
        parts.push(Cow::Borrowed("--quiet"));
        parts.extend(dependencies.iter().map(|dep| shell_quote(dep)));
        parts.push(Cow::Borrowed("&&"));
    }

    parts.push(Cow::Borrowed(settings.interpreter.as_str()));
    parts.push(Cow::Owned(settings.script_path(SCRIPT_FILENAME)));

    parts.join(" ")
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '.' | '_' | '-' | '=' | '!' | '~' | '+' | ',' | '@' | '/' | ':'
        )
}

/// Single-quote anything that is not a plain requirement specifier
fn shell_quote(value: &str) -> Cow<'_, str> {
    if !value.is_empty() && value.chars().all(is_plain) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_without_dependencies() {
        let settings = SandboxSettings::default();
        let command = build_named(
            &settings,
            Path::new("/tmp/python_repl123"),
            &[],
            "pyexec-test".to_string(),
        );

        assert_eq!(
            command.args(),
            vec![
                "run",
                "--rm",
                "--name",
                "pyexec-test",
                "-v",
                "/tmp/python_repl123:/app",
                "mcr.microsoft.com/playwright/python:v1.49.1-noble",
                "sh",
                "-c",
                "python /app/script.py",
            ]
        );
    }

    #[test]
    fn test_install_step_gates_script_run() {
        let settings = SandboxSettings::default();
        let shell = shell_command(&settings, &deps(&["requests", "beautifulsoup4"]));

        assert_eq!(
            shell,
            "python -m pip install --quiet requests beautifulsoup4 && python /app/script.py"
        );
        let install = shell.find("pip install").unwrap();
        let chain = shell.find("&&").unwrap();
        let run = shell.rfind("python /app/script.py").unwrap();
        assert!(install < chain && chain < run);
    }

    #[test]
    fn test_uses_configured_image_and_mount() {
        let mut settings = SandboxSettings::default().with_image("python:3.12-slim");
        settings.mount_path = "/work".to_string();
        let command = build(&settings, Path::new("/tmp/ws"), &[]);

        assert_eq!(command.image, "python:3.12-slim");
        assert_eq!(command.mounts[0].volume_arg(), "/tmp/ws:/work");
        assert_eq!(command.shell_command, "python /work/script.py");
        assert!(command.name.starts_with("pyexec-"));
    }

    #[test]
    fn test_fresh_container_name_per_build() {
        let settings = SandboxSettings::default();
        let a = build(&settings, Path::new("/tmp/ws"), &[]);
        let b = build(&settings, Path::new("/tmp/ws"), &[]);
        assert_ne!(a.name, b.name);
    }

    #[rstest]
    #[case("requests", "requests")]
    #[case("numpy==1.26.4", "numpy==1.26.4")]
    #[case("requests[socks]", "'requests[socks]'")]
    #[case("pandas>=2", "'pandas>=2'")]
    #[case("x; rm -rf /", "'x; rm -rf /'")]
    #[case("it's", r"'it'\''s'")]
    fn test_shell_quote(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(shell_quote(input), expected);
    }
}
