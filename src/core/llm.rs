//! Completion capability
//!
//! Information Hiding:
//! - Provider HTTP dialect (OpenAI vs Azure endpoints, auth headers) hidden
//! - SSE framing and tool-call delta accumulation hidden
//! - Callers see a finite stream of text and tool-call chunks per turn

use crate::actors::messages::{Message, Role, ToolCall};
use crate::config::{LLMConfig, ProviderKind};
use crate::error::{AgentError, Result};
use crate::tools::ToolSignature;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Value,
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_strict() -> bool {
    true
}

/// One piece of a model turn
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionChunk {
    Text(String),
    ToolCall(ToolCall),
}

/// Chunks of one turn; the end of the stream marks turn completion
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSignature>,
    pub response_format: Option<ResponseFormat>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, tools: Vec<ToolSignature>) -> Self {
        Self {
            messages,
            tools,
            response_format: None,
        }
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// The external completion service
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<ChunkStream>;
}

/// Drain a turn into its text and requested tool calls
pub async fn collect_turn(mut chunks: ChunkStream) -> Result<(String, Vec<ToolCall>)> {
    let mut text = String::new();
    let mut calls = Vec::new();
    while let Some(chunk) = chunks.next().await {
        match chunk? {
            CompletionChunk::Text(t) => text.push_str(&t),
            CompletionChunk::ToolCall(call) => calls.push(call),
        }
    }
    Ok((text, calls))
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<Value>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Chat Completions client (OpenAI or Azure OpenAI)
pub struct OpenAiCompletion {
    client: Client,
    api_key: String,
    config: LLMConfig,
}

impl OpenAiCompletion {
    pub fn new(api_key: String, config: LLMConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn url(&self) -> Result<String> {
        match self.config.provider {
            ProviderKind::OpenAi => Ok(format!(
                "{}/chat/completions",
                self.config.api_base.trim_end_matches('/')
            )),
            ProviderKind::Azure => {
                let endpoint = self.config.endpoint.as_deref().ok_or_else(|| {
                    AgentError::Config("azure provider needs llm.endpoint".to_string())
                })?;
                let deployment = self.config.deployment.as_deref().ok_or_else(|| {
                    AgentError::Config("azure provider needs llm.deployment".to_string())
                })?;
                Ok(format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint.trim_end_matches('/'),
                    deployment,
                    self.config.api_version
                ))
            }
        }
    }

    fn build_request(&self, request: CompletionRequest) -> ChatRequest {
        let model = match self.config.provider {
            ProviderKind::OpenAi => Some(self.config.model.clone()),
            // The deployment selects the model
            ProviderKind::Azure => None,
        };

        ChatRequest {
            model,
            messages: request.messages.iter().map(wire_message).collect(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: true,
            tools: request.tools.iter().map(wire_tool).collect(),
            response_format: request.response_format,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let url = self.url()?;
        let body = self.build_request(request);
        tracing::debug!(
            "[Completion] POST {} ({} messages, {} tools)",
            url,
            body.messages.len(),
            body.tools.len()
        );

        let http = self.client.post(&url).json(&body);
        let http = match self.config.provider {
            ProviderKind::OpenAi => http.header("Authorization", format!("Bearer {}", self.api_key)),
            ProviderKind::Azure => http.header("api-key", &self.api_key),
        };

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("[Completion] API returned error status {}: {}", status, error_text);
            return Err(AgentError::Completion(format!(
                "API error {}: {}",
                status, error_text
            )));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(sse_chunks(bytes))
    }
}

fn wire_message(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let mut wire = json!({ "role": role, "content": message.content });
    if !message.tool_calls.is_empty() {
        if message.content.is_empty() {
            wire["content"] = Value::Null;
        }
        wire["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": Value::Object(call.arguments.clone()).to_string(),
                    }
                })
            })
            .collect();
    }
    if let Some(id) = &message.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }
    wire
}

fn wire_tool(signature: &ToolSignature) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": signature.name,
            "description": signature.description,
            "parameters": signature.input_schema(),
        }
    })
}

struct SseState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<CompletionChunk>>,
    calls: BTreeMap<usize, PartialCall>,
    finished: bool,
}

impl SseState {
    /// Handle one complete SSE line. Returns true on the `[DONE]` terminator.
    fn handle_line(&mut self, line: &str) -> Result<bool> {
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(false);
        };
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(true);
        }
        if data.is_empty() {
            return Ok(false);
        }

        let chunk: StreamChunk = serde_json::from_str(data)
            .map_err(|e| AgentError::Completion(format!("malformed stream chunk: {}", e)))?;

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    self.pending.push_back(Ok(CompletionChunk::Text(content)));
                }
            }
            for delta in choice.delta.tool_calls {
                let partial = self.calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    partial.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        partial.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Tool calls are only complete once the turn ends
    fn flush_calls(&mut self) {
        for (_, partial) in std::mem::take(&mut self.calls) {
            let arguments = if partial.arguments.trim().is_empty() {
                Ok(Map::new())
            } else {
                serde_json::from_str::<Map<String, Value>>(&partial.arguments).map_err(|e| {
                    AgentError::Completion(format!(
                        "invalid arguments for tool '{}': {}",
                        partial.name, e
                    ))
                })
            };

            self.pending.push_back(arguments.map(|arguments| {
                CompletionChunk::ToolCall(ToolCall {
                    id: partial.id,
                    name: partial.name,
                    arguments,
                })
            }));
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.flush_calls();
    }
}

fn sse_chunks(bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> ChunkStream {
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        calls: BTreeMap::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    while let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                        let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&raw);
                        match state.handle_line(line.trim_end()) {
                            Ok(true) => {
                                state.finish();
                                break;
                            }
                            Ok(false) => {}
                            Err(e) => {
                                state.pending.push_back(Err(e));
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => state.pending.push_back(Err(AgentError::from(e))),
                None => {
                    // Only an unterminated [DONE] may trail the last newline
                    let tail = String::from_utf8_lossy(&state.buffer).to_string();
                    state.buffer.clear();
                    match state.handle_line(tail.trim_end()) {
                        Ok(true) => state.finish(),
                        Ok(false) => state.pending.push_back(Err(AgentError::Completion(
                            "stream ended before [DONE]".to_string(),
                        ))),
                        Err(e) => state.pending.push_back(Err(e)),
                    }
                }
            }
        }
    }))
}
