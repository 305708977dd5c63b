//! mcp-orchestra - agent orchestration over stdio tool processes
//!
//! Questions are routed by a model-driven [`Router`] to one of several
//! configured agents. Each agent drives a completion service through a
//! function-calling loop whose tools live in child processes speaking
//! JSON-RPC over stdin/stdout.

pub mod actors;
pub mod api;
pub mod cli;
mod config;
pub mod core;
pub mod error;
pub mod tools;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use api::*;
pub use config::{AgentSpec, LLMConfig, ProviderKind, ServerConfig, Settings};
pub use error::{AgentError, ErrorKind, ErrorResponse, Result};

pub use actors::agent_builder::{Agent, AgentBuilder};
pub use actors::completion_driver::{CompletionDriver, DriverOutput};
pub use actors::messages::{
    HandleRequest, HandleResponse, Message, MessageHistory, ResponseFragment, Role,
    RoutingDecision, ToolCall, ToolCallMetadata,
};
pub use actors::orchestrator::{AgentOrchestrator, HealthReport};
pub use actors::router_agent::{AgentProfile, Router};
pub use core::llm::{
    CompletionChunk, CompletionProvider, CompletionRequest, JsonSchemaFormat, OpenAiCompletion,
    ResponseFormat,
};
pub use core::mcp::{ChannelState, ToolChannel};
pub use tools::registry::ToolRegistry;
pub use tools::{ToolConfig, ToolResult, ToolSignature};

use once_cell::sync::OnceCell;
use std::sync::Arc;

static SYSTEM: OnceCell<System> = OnceCell::new();

pub struct System {
    orchestrator: AgentOrchestrator,
}

impl System {
    fn global() -> Result<&'static System> {
        SYSTEM.get().ok_or_else(|| {
            AgentError::Config("System not initialized. Call init() first".to_string())
        })
    }
}

/// Initialize the system from configuration and environment.
///
/// Starts every configured tool server; if anything is missing or fails to
/// start, no request will be accepted.
pub async fn init() -> Result<()> {
    let settings = Settings::new()?;
    settings.validate()?;
    let api_key = settings.api_key()?;

    let provider: Arc<dyn CompletionProvider> =
        Arc::new(OpenAiCompletion::new(api_key, settings.llm.clone())?);
    let orchestrator = AgentOrchestrator::from_settings(&settings, provider).await?;
    init_with(orchestrator).await
}

/// Initialize the system with a prepared orchestrator
pub async fn init_with(orchestrator: AgentOrchestrator) -> Result<()> {
    if SYSTEM.get().is_some() {
        orchestrator.shutdown().await?;
        return Err(AgentError::Config("System already initialized".to_string()));
    }

    let agents = orchestrator.profiles().len();
    if let Err(rejected) = SYSTEM.set(System { orchestrator }) {
        // Lost a race with a concurrent init
        rejected.orchestrator.shutdown().await?;
        return Err(AgentError::Config("System already initialized".to_string()));
    }

    tracing::info!("mcp-orchestra initialized with {} agents", agents);
    Ok(())
}

/// Stop every tool process. Safe to call more than once.
pub async fn shutdown() -> Result<()> {
    if let Some(system) = SYSTEM.get() {
        system.orchestrator.shutdown().await?;
    }
    tracing::info!("mcp-orchestra shutdown complete");
    Ok(())
}
