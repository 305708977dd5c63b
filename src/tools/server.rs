//! Tool Server - the tool-process side of the wire protocol
//!
//! Information Hiding:
//! - JSON-RPC framing and method dispatch hidden behind `serve`
//! - Tool execution errors normalised into `ToolResult::Failure`
//! - Only protocol frames are written to the output stream

use super::{Tool, ToolResult, ToolSignature};
use crate::core::protocol::{
    parse_frame, CallToolParams, CallToolResult, Frame, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, McpTool, INTERNAL_ERROR, INVALID_PARAMS, METHOD_INITIALIZE,
    METHOD_NOT_FOUND, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PARSE_ERROR, PROTOCOL_VERSION,
};
use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Hosts a set of tools over newline-delimited JSON-RPC
pub struct ToolServer {
    name: String,
    version: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools: Vec::new(),
        }
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn signatures(&self) -> Vec<ToolSignature> {
        self.tools.iter().map(|tool| tool.metadata()).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.metadata().name == name)
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            "[{}] Serving {} tools on stdio",
            self.name,
            self.tools.len()
        );

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                tracing::info!("[{}] Input closed, exiting", self.name);
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let mut bytes = serde_json::to_vec(&response)?;
                bytes.push(b'\n');
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
        }
    }

    /// Answer one incoming line; notifications and stray responses get no reply
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match parse_frame(line) {
            Ok(Frame::Request(request)) => Some(self.handle_request(request).await),
            Ok(Frame::Notification(notification)) => {
                tracing::debug!("[{}] Notification: {}", self.name, notification.method);
                None
            }
            Ok(Frame::Response(_)) => {
                tracing::warn!("[{}] Ignoring unexpected response frame", self.name);
                None
            }
            Err(e) => {
                tracing::warn!("[{}] {}", self.name, e);
                Some(JsonRpcResponse::error(None, PARSE_ERROR, e))
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;
        match request.method.as_str() {
            METHOD_INITIALIZE => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": self.name, "version": self.version},
                }),
            ),
            METHOD_TOOLS_LIST => {
                let listing = ListToolsResult {
                    tools: self.signatures().iter().map(McpTool::from).collect(),
                };
                to_response(id, &listing)
            }
            METHOD_TOOLS_CALL => {
                let params: CallToolParams =
                    match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                        Ok(params) => params,
                        Err(e) => {
                            return JsonRpcResponse::error(
                                id,
                                INVALID_PARAMS,
                                format!("invalid tools/call params: {}", e),
                            )
                        }
                    };
                let result = self.call(&params.name, params.arguments).await;
                to_response(id, &CallToolResult::from(&result))
            }
            other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown method: {}", other)),
        }
    }

    async fn call(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(tool) = self.find(name) else {
            return ToolResult::failure(format!("Unknown tool: {}", name));
        };

        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };

        if let Err(e) = tool.validate(&arguments) {
            return ToolResult::failure(e.to_string());
        }

        tracing::info!("[{}] Executing tool: {}", self.name, name);
        match tool.execute(arguments).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("[{}] Tool '{}' failed: {}", self.name, name, e);
                ToolResult::failure(e.to_string())
            }
        }
    }
}

fn to_response<T: serde::Serialize>(id: Option<u64>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    }
}
