use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pyexec_sandbox::ExecutionOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::ToolContext;

pub const EXECUTE_PYTHON: &str = "execute-python";

const EXECUTE_PYTHON_DESCRIPTION: &str = "Execute Python code in an isolated environment. \
Playwright and headless browser are available for web scraping. Use this tool when you need \
real-time information, don't have the information internally and no other tools can provide \
this information. Only output printed to stdout or stderr is returned so ALWAYS use print \
statements! Please note all code is run in an ephemeral container so modules and code do NOT \
persist!";

// MCP Tool Types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsRequest {
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub type_name: String,
    pub properties: HashMap<String, ToolInputSchemaProperty>,
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchemaProperty {
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ToolInputSchemaProperty {
    pub fn string(description: &str) -> Self {
        Self {
            type_name: Some("string".to_string()),
            description: Some(description.to_string()),
            enum_values: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: Some(true),
        }
    }
}

impl From<ExecutionOutcome> for CallToolResult {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success { stdout } => CallToolResult::text(stdout),
            ExecutionOutcome::Failure { message, .. } => CallToolResult::error(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Something a registered tool name dispatches to
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Option<Value>) -> CallToolResult;
}

struct RegisteredTool {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

/// Name → (schema, handler) registry backing tools/list and tools/call.
/// Listing order is registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any earlier one with the same name
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        input_schema: ToolInputSchema,
        handler: Arc<dyn ToolHandler>,
    ) {
        let tool = Tool {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema,
        };
        self.tools.retain(|registered| registered.tool.name != name);
        self.tools.push(RegisteredTool { tool, handler });
        info!("Registered tool: {}", name);
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(|registered| registered.tool.clone()).collect()
    }

    fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools
            .iter()
            .find(|registered| registered.tool.name == name)
            .map(|registered| registered.handler.clone())
    }
}

/// The execute-python tool: runs `code` in a throwaway container
pub struct ExecutePythonTool {
    context: ToolContext,
}

impl ExecutePythonTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    pub fn input_schema() -> ToolInputSchema {
        let mut properties = HashMap::new();

        properties.insert(
            "code".to_string(),
            ToolInputSchemaProperty::string("The Python code to execute"),
        );

        properties.insert(
            "modules".to_string(),
            ToolInputSchemaProperty::string(
                "Comma-separated list of Python modules your code requires. If your code requires external modules you MUST pass them here! These will installed automatically.",
            ),
        );

        ToolInputSchema {
            type_name: "object".to_string(),
            properties,
            required: vec!["code".to_string()],
        }
    }
}

#[async_trait]
impl ToolHandler for ExecutePythonTool {
    async fn call(&self, arguments: Option<Value>) -> CallToolResult {
        self.context
            .executor()
            .execute_arguments(arguments.as_ref())
            .await
            .into()
    }
}

/// Register every tool this server exposes
pub fn register_builtin_tools(registry: &mut ToolRegistry, context: ToolContext) {
    registry.register(
        EXECUTE_PYTHON,
        EXECUTE_PYTHON_DESCRIPTION,
        ExecutePythonTool::input_schema(),
        Arc::new(ExecutePythonTool::new(context)),
    );
}

// Tool handlers
pub async fn tools_list(
    registry: &ToolRegistry,
    _request: Option<ListToolsRequest>,
) -> Result<ListToolsResult> {
    Ok(ListToolsResult {
        tools: registry.list(),
        next_cursor: None,
    })
}

pub async fn tools_call(
    registry: &ToolRegistry,
    request: Option<CallToolRequest>,
) -> Result<CallToolResult> {
    let call_request = request.ok_or_else(|| anyhow!("Missing tool call request"))?;
    debug!("Calling tool: {}", call_request.name);

    match registry.handler(&call_request.name) {
        Some(handler) => Ok(handler.call(call_request.arguments).await),
        None => Ok(CallToolResult::error(format!(
            "Unknown tool: {}",
            call_request.name
        ))),
    }
}
