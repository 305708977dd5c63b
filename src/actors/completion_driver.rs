//! Completion Driver - function-calling loop over the completion capability
//!
//! Information Hiding:
//! - Hides the resubmission loop between model turns and tool calls
//! - Hides how tool results are fed back into the conversation
//! - Exposes a lazy fragment stream and a simple `run` interface

use crate::actors::messages::{
    MessageHistory, ResponseFragment, ToolCall, ToolCallMetadata,
};
use crate::core::llm::{
    ChunkStream, CompletionChunk, CompletionProvider, CompletionRequest, ResponseFormat,
};
use crate::error::{AgentError, Result};
use crate::tools::registry::ToolRegistry;
use crate::tools::ToolSignature;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Final outcome of a driven completion
#[derive(Debug, Clone, Default)]
pub struct DriverOutput {
    pub text: String,
    pub tool_calls: Vec<ToolCallMetadata>,
}

/// Drives the completion capability until it stops requesting tools
#[derive(Clone)]
pub struct CompletionDriver {
    label: String,
    provider: Arc<dyn CompletionProvider>,
    max_tool_iterations: usize,
    response_format: Option<ResponseFormat>,
}

impl CompletionDriver {
    pub fn new(provider: Arc<dyn CompletionProvider>, max_tool_iterations: usize) -> Self {
        Self {
            label: "Driver".to_string(),
            provider,
            max_tool_iterations,
            response_format: None,
        }
    }

    /// Name used in log lines
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn max_tool_iterations(&self) -> usize {
        self.max_tool_iterations
    }

    /// Lazily drive the conversation, yielding fragments as they arrive.
    ///
    /// The stream owns `history`; it ends after the first error.
    pub fn stream<'a>(
        &'a self,
        history: MessageHistory,
        tools: &'a ToolRegistry,
    ) -> impl Stream<Item = Result<ResponseFragment>> + Send + 'a {
        futures::stream::unfold(ToolLoop::new(self, history, tools), |mut tool_loop| async move {
            tool_loop
                .next_event()
                .await
                .map(|event| (event, tool_loop))
        })
    }

    /// Drive to completion and return the concatenated text.
    ///
    /// The turns are appended to `history` only if the whole run succeeds.
    pub async fn run(
        &self,
        history: &mut MessageHistory,
        tools: &ToolRegistry,
    ) -> Result<DriverOutput> {
        let mut tool_loop = ToolLoop::new(self, history.clone(), tools);
        let mut output = DriverOutput::default();

        while let Some(event) = tool_loop.next_event().await {
            match event? {
                ResponseFragment::Text(text) => output.text.push_str(&text),
                ResponseFragment::ToolCompleted(metadata) => output.tool_calls.push(metadata),
            }
        }

        *history = tool_loop.history;
        Ok(output)
    }

    /// `run` bounded by a caller-supplied deadline; on expiry the in-flight
    /// call is dropped and `history` is left untouched.
    pub async fn run_with_timeout(
        &self,
        history: &mut MessageHistory,
        tools: &ToolRegistry,
        limit: Duration,
    ) -> Result<DriverOutput> {
        match tokio::time::timeout(limit, self.run(history, tools)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("[{}] Completion timed out after {:?}", self.label, limit);
                Err(AgentError::Timeout(limit))
            }
        }
    }
}

/// State of one driven conversation
struct ToolLoop<'a> {
    driver: &'a CompletionDriver,
    tools: &'a ToolRegistry,
    signatures: Vec<ToolSignature>,
    history: MessageHistory,
    chunks: Option<ChunkStream>,
    turn_text: String,
    turn_calls: Vec<ToolCall>,
    pending: VecDeque<ToolCall>,
    tool_rounds: usize,
    done: bool,
}

impl<'a> ToolLoop<'a> {
    fn new(driver: &'a CompletionDriver, history: MessageHistory, tools: &'a ToolRegistry) -> Self {
        Self {
            driver,
            tools,
            signatures: tools.signatures(),
            history,
            chunks: None,
            turn_text: String::new(),
            turn_calls: Vec::new(),
            pending: VecDeque::new(),
            tool_rounds: 0,
            done: false,
        }
    }

    async fn next_event(&mut self) -> Option<Result<ResponseFragment>> {
        match self.step().await {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                tracing::error!("[{}] {}", self.driver.label, e);
                Some(Err(e))
            }
        }
    }

    async fn step(&mut self) -> Result<Option<ResponseFragment>> {
        loop {
            if self.done {
                return Ok(None);
            }

            if let Some(call) = self.pending.pop_front() {
                return self.invoke(call).await.map(Some);
            }

            let Some(chunks) = self.chunks.as_mut() else {
                self.begin_turn().await?;
                continue;
            };

            match chunks.next().await {
                Some(chunk) => match chunk? {
                    CompletionChunk::Text(text) => {
                        self.turn_text.push_str(&text);
                        return Ok(Some(ResponseFragment::Text(text)));
                    }
                    CompletionChunk::ToolCall(call) => self.turn_calls.push(call),
                },
                None => self.end_turn()?,
            }
        }
    }

    async fn begin_turn(&mut self) -> Result<()> {
        tracing::debug!(
            "[{}] Turn {} ({} messages)",
            self.driver.label,
            self.tool_rounds + 1,
            self.history.len()
        );

        let mut request =
            CompletionRequest::new(self.history.messages().to_vec(), self.signatures.clone());
        request.response_format = self.driver.response_format.clone();

        self.chunks = Some(self.driver.provider.complete(request).await?);
        self.turn_text.clear();
        self.turn_calls.clear();
        Ok(())
    }

    fn end_turn(&mut self) -> Result<()> {
        self.chunks = None;
        let text = std::mem::take(&mut self.turn_text);
        let calls = std::mem::take(&mut self.turn_calls);

        if calls.is_empty() {
            self.history.push_assistant(text);
            self.done = true;
            return Ok(());
        }

        if self.tool_rounds >= self.driver.max_tool_iterations {
            return Err(AgentError::ToolLoopExceeded {
                limit: self.driver.max_tool_iterations,
            });
        }
        self.tool_rounds += 1;

        tracing::debug!(
            "[{}] Model requested {} tool call(s)",
            self.driver.label,
            calls.len()
        );
        self.history.push_tool_calls(text, calls.clone());
        self.pending.extend(calls);
        Ok(())
    }

    async fn invoke(&mut self, call: ToolCall) -> Result<ResponseFragment> {
        tracing::info!("[{}] Executing tool: {}", self.driver.label, call.name);
        let started = Instant::now();

        let result = self.tools.invoke(&call).await?;
        if let Some(kind) = result.error_kind() {
            tracing::warn!(
                "[{}] Tool '{}' returned {}: {}",
                self.driver.label,
                call.name,
                kind,
                result.to_observation()
            );
        }
        self.history.push_tool_result(&call, &result);

        Ok(ResponseFragment::ToolCompleted(ToolCallMetadata {
            call,
            result,
            duration_ms: started.elapsed().as_millis() as u64,
        }))
    }
}
