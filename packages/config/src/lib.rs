// ABOUTME: Shared configuration constants for pyexec
// ABOUTME: Re-exports environment variable names used by the sandbox engine and MCP server

pub mod constants;
