//! Async facade over the global system
//!
//! All functions fail with a `Config` error until `init()` has succeeded.

use crate::actors::messages::{HandleRequest, HandleResponse};
use crate::actors::orchestrator::{AgentOrchestrator, HealthReport};
use crate::error::{ErrorResponse, Result};
use crate::tools::ToolSignature;
use crate::System;
use std::time::Duration;

/// The orchestrator behind the global system
pub fn orchestrator() -> Result<&'static AgentOrchestrator> {
    System::global().map(|system| &system.orchestrator)
}

/// Ask a question and get the final answer text
pub async fn ask(question: impl Into<String>) -> Result<String> {
    let question = question.into();
    orchestrator()?.handle(&question, None).await
}

/// Ask on behalf of a customer; the identifier frames the question
pub async fn ask_as(question: impl Into<String>, customer_id: impl Into<String>) -> Result<String> {
    let question = question.into();
    let customer_id = customer_id.into();
    orchestrator()?
        .handle(&question, Some(customer_id.as_str()))
        .await
}

pub async fn ask_with_timeout(
    question: impl Into<String>,
    customer_id: Option<String>,
    limit: Duration,
) -> Result<String> {
    let question = question.into();
    orchestrator()?
        .handle_with_timeout(&question, customer_id.as_deref(), limit)
        .await
}

/// External entry point: `{question, customer_id?}` to `{answer}` or a
/// machine-readable error
pub async fn handle(request: HandleRequest) -> std::result::Result<HandleResponse, ErrorResponse> {
    let orchestrator = orchestrator().map_err(ErrorResponse::from)?;
    orchestrator
        .handle(&request.question, request.customer_id.as_deref())
        .await
        .map(|answer| HandleResponse { answer })
        .map_err(ErrorResponse::from)
}

pub async fn health() -> Result<HealthReport> {
    Ok(orchestrator()?.health())
}

/// Every agent with the tool signatures its servers advertised
pub fn tools() -> Result<Vec<(String, Vec<ToolSignature>)>> {
    Ok(orchestrator()?
        .agents()
        .map(|agent| (agent.name().to_string(), agent.tools().signatures()))
        .collect())
}

pub mod batch {
    use super::*;
    use futures::stream::{self, StreamExt};

    /// Answer many questions concurrently. Results come back in completion
    /// order, each paired with its question.
    pub async fn process_questions(
        questions: Vec<String>,
        concurrency: usize,
    ) -> Vec<(String, Result<String>)> {
        stream::iter(questions)
            .map(|question| async move {
                let answer = ask(question.clone()).await;
                (question, answer)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    pub async fn process_requests(
        requests: Vec<HandleRequest>,
        concurrency: usize,
    ) -> Vec<std::result::Result<HandleResponse, ErrorResponse>> {
        stream::iter(requests)
            .map(handle)
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}
