// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across pyexec

// Sandbox Engine Configuration
pub const PYEXEC_CONTAINER_RUNTIME: &str = "PYEXEC_CONTAINER_RUNTIME";
pub const PYEXEC_IMAGE: &str = "PYEXEC_IMAGE";
pub const PYEXEC_TIMEOUT_SECS: &str = "PYEXEC_TIMEOUT_SECS";
pub const PYEXEC_WORKSPACE_ROOT: &str = "PYEXEC_WORKSPACE_ROOT";

// MCP Server Configuration
pub const PYEXEC_SSE: &str = "PYEXEC_SSE";
pub const PYEXEC_SSE_ADDR: &str = "PYEXEC_SSE_ADDR";

// Logging
pub const RUST_LOG: &str = "RUST_LOG";
