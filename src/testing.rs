//! Test doubles shared by unit tests

use crate::actors::messages::ToolCall;
use crate::config::ServerConfig;
use crate::core::llm::{ChunkStream, CompletionChunk, CompletionProvider, CompletionRequest};
use crate::error::{AgentError, Result};
use crate::tools::ToolConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A `sh` tool server that completes the handshake advertising `tools`
/// (no parameters), then runs `tail`.
pub(crate) fn scripted_server(name: &str, tools: &[&str], tail: &str) -> ServerConfig {
    let listed: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool,
                "description": format!("{} tool", tool),
                "inputSchema": {"type": "object", "properties": {}}
            })
        })
        .collect();
    let list_reply = json!({"jsonrpc": "2.0", "id": 2, "result": {"tools": listed}});

    let script = format!(
        r#"read l; echo '{{"jsonrpc":"2.0","id":1,"result":{{}}}}'; read l; read l; echo '{}'; {}"#,
        list_reply, tail
    );
    ServerConfig::new(name, "sh", vec!["-c".to_string(), script])
}

/// Script fragment: read one request and answer it with text content
pub(crate) fn call_reply(id: u64, text: &str) -> String {
    let reply = json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"content": [{"type": "text", "text": text}], "isError": false}
    });
    format!("read l; echo '{}'", reply)
}

pub(crate) fn scripted_tool_config() -> ToolConfig {
    ToolConfig {
        handshake_timeout: Duration::from_secs(2),
        call_timeout: Duration::from_secs(2),
    }
}

/// Completion provider that replays canned turns and records every request
pub(crate) struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<CompletionChunk>>>,
    repeat_last: bool,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn new(turns: Vec<Vec<CompletionChunk>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            repeat_last: false,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same turn
    pub(crate) fn always(turn: Vec<CompletionChunk>) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![turn])
        }
    }

    pub(crate) fn text(answer: &str) -> Self {
        Self::always(vec![CompletionChunk::Text(answer.to_string())])
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub(crate) fn tool_call(id: &str, name: &str, arguments: Value) -> CompletionChunk {
    CompletionChunk::ToolCall(ToolCall::new(id, name, arguments))
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let turn = {
            let mut turns = self.turns.lock().unwrap();
            if self.repeat_last && turns.len() == 1 {
                turns.front().cloned()
            } else {
                turns.pop_front()
            }
        };

        let turn = turn.ok_or_else(|| AgentError::Completion("script exhausted".to_string()))?;
        Ok(Box::pin(futures::stream::iter(turn.into_iter().map(Ok))))
    }
}
