use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::mcp::{
    self, error_response, parse_params, success_response, RpcError, INVALID_REQUEST, PARSE_ERROR,
};
use crate::tools::{self, ToolRegistry};

const CANCELLED_NOTIFICATION: &str = "notifications/cancelled";

/// One decoded JSON-RPC message
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// Carries an id but no method; answered with INVALID_REQUEST
    Invalid { id: Value },
    /// Client responses and other traffic we never answer
    Ignored,
}

impl Incoming {
    pub fn classify(message: Value) -> Self {
        let Value::Object(mut object) = message else {
            return Incoming::Invalid { id: Value::Null };
        };

        let id = object.remove("id").filter(|id| !id.is_null());
        let params = object.remove("params");
        let method = object
            .get("method")
            .and_then(|m| m.as_str())
            .map(str::to_string);

        match (method, id) {
            (Some(method), Some(id)) => Incoming::Request { id, method, params },
            (Some(method), None) => Incoming::Notification { method, params },
            (None, Some(_)) if object.contains_key("result") || object.contains_key("error") => {
                Incoming::Ignored
            }
            (None, Some(id)) => Incoming::Invalid { id },
            (None, None) => Incoming::Ignored,
        }
    }
}

/// Key an in-flight request by its id's JSON text, so `1` and `"1"` stay distinct
pub fn request_key(id: &Value) -> String {
    id.to_string()
}

/// The request a `notifications/cancelled` message names, if any
pub fn cancelled_request(method: &str, params: Option<&Value>) -> Option<String> {
    if method != CANCELLED_NOTIFICATION {
        return None;
    }
    params
        .and_then(|p| p.get("requestId"))
        .map(request_key)
}

pub fn parse_error_response(error: &serde_json::Error) -> Value {
    error_response(Value::Null, PARSE_ERROR, format!("Parse error: {}", error))
}

pub fn invalid_request_response(id: Value) -> Value {
    error_response(id, INVALID_REQUEST, "Invalid request")
}

pub fn duplicate_request_response(id: Value) -> Value {
    error_response(id, INVALID_REQUEST, "Request id already in flight")
}

/// Transport-independent MCP request handler
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub async fn handle_rpc_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcError> {
        match method {
            "initialize" => {
                let result = mcp::initialize(parse_params(params)?).await?;
                Ok(serde_json::to_value(result)?)
            }
            "ping" => Ok(mcp::ping(params).await?),
            "logging/setLevel" => Ok(mcp::logging_set_level(parse_params(params)?).await?),
            "tools/list" => {
                let result = tools::tools_list(&self.registry, parse_params(params)?).await?;
                Ok(serde_json::to_value(result)?)
            }
            "tools/call" => {
                let result = tools::tools_call(&self.registry, parse_params(params)?).await?;
                Ok(serde_json::to_value(result)?)
            }
            _ => Err(RpcError::MethodNotFound(method.to_string())),
        }
    }

    /// Run one request to completion and build its response envelope
    pub async fn handle_request(&self, id: Value, method: &str, params: Option<Value>) -> Value {
        match self.handle_rpc_request(method, params).await {
            Ok(result) => success_response(id, result),
            Err(e) => {
                warn!("Request {} ({}) failed: {}", id, method, e);
                error_response(id, e.code(), e.to_string())
            }
        }
    }

    /// Serve newline-delimited JSON-RPC until input closes or `shutdown` resolves.
    /// After end of input, requests already running are allowed to finish.
    pub async fn serve_lines<R, W, S>(&self, reader: R, mut writer: W, shutdown: S) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let mut lines = reader.lines();
        let mut tasks: JoinSet<(String, Value)> = JoinSet::new();
        let mut in_flight: HashMap<String, AbortHandle> = HashMap::new();
        let mut input_open = true;
        tokio::pin!(shutdown);

        loop {
            if !input_open && tasks.is_empty() {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, abandoning {} in-flight requests", tasks.len());
                    break;
                }
                line = lines.next_line(), if input_open => {
                    match line? {
                        Some(line) => {
                            let reply = self.dispatch_line(&line, &mut tasks, &mut in_flight);
                            if let Some(reply) = reply {
                                write_message(&mut writer, &reply).await?;
                            }
                        }
                        None => {
                            debug!("Input closed with {} requests in flight", tasks.len());
                            input_open = false;
                        }
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok((key, response)) => {
                            in_flight.remove(&key);
                            write_message(&mut writer, &response).await?;
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => error!("Request task failed: {}", e),
                    }
                }
                else => break,
            }
        }

        tasks.shutdown().await;
        Ok(())
    }

    /// Serve MCP over this process's stdin/stdout, stopping on Ctrl-C
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("Serving MCP over stdio");
        let reader = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve_lines(reader, tokio::io::stdout(), shutdown_signal())
            .await
    }

    fn dispatch_line(
        &self,
        line: &str,
        tasks: &mut JoinSet<(String, Value)>,
        in_flight: &mut HashMap<String, AbortHandle>,
    ) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        debug!("Received: {}", line);

        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unparseable message: {}", e);
                return Some(parse_error_response(&e));
            }
        };

        match Incoming::classify(message) {
            Incoming::Request { id, method, params } => {
                let key = request_key(&id);
                if in_flight.contains_key(&key) {
                    warn!("Rejecting request {}: id already in flight", key);
                    return Some(duplicate_request_response(id));
                }
                let server = self.clone();
                let task_key = key.clone();
                let handle = tasks.spawn(async move {
                    let response = server.handle_request(id, &method, params).await;
                    (task_key, response)
                });
                in_flight.insert(key, handle);
                None
            }
            Incoming::Notification { method, params } => {
                if let Some(key) = cancelled_request(&method, params.as_ref()) {
                    if let Some(handle) = in_flight.remove(&key) {
                        info!("Cancelling request {}", key);
                        handle.abort();
                    }
                }
                None
            }
            Incoming::Invalid { id } => Some(invalid_request_response(id)),
            Incoming::Ignored => None,
        }
    }
}

async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
