//! JSON-RPC 2.0 frames of the tool wire protocol
//!
//! One frame per line on the tool process's stdin/stdout. The method set is the
//! MCP subset needed for signature discovery and tool invocation.

use crate::tools::{ToolResult, ToolSignature};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Outgoing request or notification (a notification has no id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<u64>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<u64>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A classified incoming line
#[derive(Debug)]
pub enum Frame {
    Request(JsonRpcRequest),
    Notification(JsonRpcRequest),
    Response(JsonRpcResponse),
}

/// Classify one protocol line.
///
/// Anything that is not a JSON-RPC 2.0 object is rejected; the caller decides
/// whether that is fatal.
pub fn parse_frame(line: &str) -> Result<Frame, String> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| format!("not a JSON frame ({}): {}", e, truncate(line, 120)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| format!("frame is not an object: {}", truncate(line, 120)))?;

    if obj.get("jsonrpc").and_then(|v| v.as_str()) != Some(JSONRPC_VERSION) {
        return Err(format!("missing jsonrpc 2.0 marker: {}", truncate(line, 120)));
    }

    if obj.contains_key("method") {
        let request: JsonRpcRequest =
            serde_json::from_value(value).map_err(|e| format!("malformed request: {}", e))?;
        return Ok(if request.id.is_some() {
            Frame::Request(request)
        } else {
            Frame::Notification(request)
        });
    }

    if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
        let response: JsonRpcResponse =
            serde_json::from_value(value).map_err(|e| format!("malformed response: {}", e))?;
        return Ok(Frame::Response(response));
    }

    Err(format!("unrecognised frame: {}", truncate(line, 120)))
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Tool entry of a `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

impl From<McpTool> for ToolSignature {
    fn from(tool: McpTool) -> Self {
        ToolSignature::from_input_schema(
            tool.name,
            tool.description.unwrap_or_default(),
            &tool.input_schema,
        )
    }
}

impl From<&ToolSignature> for McpTool {
    fn from(sig: &ToolSignature) -> Self {
        Self {
            name: sig.name.clone(),
            description: Some(sig.description.clone()),
            input_schema: sig.input_schema(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<CallToolResult> for ToolResult {
    fn from(result: CallToolResult) -> Self {
        let text = result.text();
        if result.is_error {
            return ToolResult::failure(text);
        }
        if let Some(structured) = result.structured_content {
            return ToolResult::success(structured);
        }
        // Structured values are often shipped as JSON text
        match serde_json::from_str::<Value>(&text) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => ToolResult::success(value),
            _ => ToolResult::success(text),
        }
    }
}

impl From<&ToolResult> for CallToolResult {
    fn from(result: &ToolResult) -> Self {
        match result {
            ToolResult::Success {
                value: Value::String(s),
            } => CallToolResult {
                content: vec![ContentBlock::Text { text: s.clone() }],
                is_error: false,
                structured_content: None,
            },
            ToolResult::Success { value } => CallToolResult {
                content: vec![ContentBlock::Text {
                    text: value.to_string(),
                }],
                is_error: false,
                structured_content: Some(value.clone()),
            },
            ToolResult::Failure { error } => CallToolResult {
                content: vec![ContentBlock::Text {
                    text: error.clone(),
                }],
                is_error: true,
                structured_content: None,
            },
        }
    }
}
