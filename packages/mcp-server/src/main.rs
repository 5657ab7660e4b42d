#!/usr/bin/env -S cargo run --bin pyexec-mcp --

use anyhow::{Context, Result};
use clap::Parser;
use pyexec_config::constants::{PYEXEC_SSE, PYEXEC_SSE_ADDR, RUST_LOG};
use pyexec_sandbox::SandboxSettings;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod context;
mod mcp;
mod server;
mod sse;
mod tools;

#[cfg(test)]
mod tests;

use context::ToolContext;
use server::McpServer;
use tools::{register_builtin_tools, ToolRegistry};

const DEFAULT_LOG_FILTER: &str = "pyexec_mcp=info,pyexec_sandbox=info";

#[derive(Parser)]
#[command(name = "pyexec-mcp")]
#[command(about = "MCP server that runs Python code in ephemeral containers")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Display available tools")]
    tools: bool,
    #[arg(long, env = PYEXEC_SSE, help = "Serve over HTTP+SSE instead of stdio")]
    sse: bool,
    #[arg(
        long,
        env = PYEXEC_SSE_ADDR,
        default_value = "localhost:8080",
        help = "Listen address for SSE mode"
    )]
    addr: String,
    #[arg(long, help = "Container image to run code in")]
    image: Option<String>,
    #[arg(long, help = "Per-run deadline in seconds (0 disables)")]
    timeout: Option<u64>,
}

fn init_logging() {
    // stdout carries the protocol in stdio mode, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(RUST_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_settings(cli: &Cli) -> Result<SandboxSettings> {
    let mut settings = SandboxSettings::from_env().context("Invalid sandbox configuration")?;
    if let Some(image) = &cli.image {
        settings = settings.with_image(image.as_str());
    }
    if let Some(timeout) = cli.timeout {
        settings = settings.with_timeout_secs(Some(timeout));
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = build_settings(&cli)?;
    let mut registry = ToolRegistry::new();

    if cli.tools {
        register_builtin_tools(&mut registry, ToolContext::new(settings));
        println!("Available tools:");
        for tool in registry.list() {
            let required = tool.input_schema.required.join(", ");
            println!("- {} (required: {})", tool.name, required);
        }
        return Ok(());
    }

    init_logging();
    info!(
        "Starting pyexec MCP server (runtime: {}, image: {})",
        settings.runtime, settings.image
    );

    let context = ToolContext::new(settings);
    if !context.executor().sandbox().is_available().await {
        warn!(
            "Container runtime '{}' is not reachable; executions will fail until it is",
            context.executor().settings().runtime
        );
    }

    register_builtin_tools(&mut registry, context);
    let server = McpServer::new(registry);

    if cli.sse {
        sse::serve_sse(server, &cli.addr)
            .await
            .with_context(|| format!("SSE server on {} failed", cli.addr))
    } else {
        server.serve_stdio().await.context("stdio server failed")
    }
}
