//! Agent Builder - assembling agents from instructions, tool servers and a driver
//!
//! Information Hiding:
//! - Hides tool server startup and registry construction
//! - Hides driver wiring (provider, iteration cap)
//! - Exposes fluent builder interface

use crate::actors::completion_driver::{CompletionDriver, DriverOutput};
use crate::actors::messages::{MessageHistory, ResponseFragment};
use crate::actors::router_agent::AgentProfile;
use crate::config::{AgentSpec, ServerConfig, Settings};
use crate::core::llm::CompletionProvider;
use crate::error::{AgentError, Result};
use crate::tools::registry::ToolRegistry;
use crate::tools::ToolConfig;
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;

/// A named agent: fixed instructions, its own tools and a completion driver.
///
/// Immutable after construction; concurrent requests share it by reference.
pub struct Agent {
    name: String,
    description: String,
    instructions: String,
    tools: ToolRegistry,
    driver: CompletionDriver,
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn profile(&self) -> AgentProfile {
        AgentProfile::new(self.name.clone(), self.description.clone())
    }

    /// Fresh history for one request: instructions then the question
    pub fn history_for(&self, question: &str) -> MessageHistory {
        MessageHistory::new(self.instructions.clone()).with_user(question)
    }

    pub async fn answer(&self, question: &str) -> Result<DriverOutput> {
        let mut history = self.history_for(question);
        self.driver.run(&mut history, &self.tools).await
    }

    pub fn answer_stream<'a>(
        &'a self,
        question: &str,
    ) -> impl Stream<Item = Result<ResponseFragment>> + Send + 'a {
        self.driver.stream(self.history_for(question), &self.tools)
    }

    /// Stop this agent's tool processes
    pub async fn close(&self) -> Result<usize> {
        self.tools.close().await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tools", &self.tools.tool_names())
            .finish()
    }
}

/// Builder for [`Agent`]
///
/// # Example
/// ```no_run
/// # async fn demo(provider: std::sync::Arc<dyn mcp_orchestra::CompletionProvider>) -> mcp_orchestra::Result<()> {
/// use mcp_orchestra::{Agent, ServerConfig};
///
/// let agent = Agent::builder("Calc")
///     .description("Arithmetic on numbers")
///     .instructions("Use the calculator tools for every computation.")
///     .server(ServerConfig::new("calculator", "calculator-server", vec![]))
///     .provider(provider)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct AgentBuilder {
    name: String,
    description: Option<String>,
    instructions: Option<String>,
    servers: Vec<ServerConfig>,
    registry: Option<ToolRegistry>,
    provider: Option<Arc<dyn CompletionProvider>>,
    max_tool_iterations: usize,
    tool_config: ToolConfig,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            instructions: None,
            servers: Vec::new(),
            registry: None,
            provider: None,
            max_tool_iterations: 5,
            tool_config: ToolConfig::default(),
        }
    }

    /// Build from a configured agent entry, resolving its server names
    pub fn from_spec(spec: &AgentSpec, settings: &Settings) -> Result<Self> {
        let servers = spec
            .servers
            .iter()
            .map(|name| {
                settings.servers.get(name).cloned().ok_or_else(|| {
                    AgentError::Config(format!(
                        "agent '{}' references unknown server '{}'",
                        spec.name, name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(spec.name.clone())
            .description(spec.description.clone())
            .instructions(spec.instructions.clone())
            .servers(servers)
            .max_tool_iterations(settings.agent.max_tool_iterations)
            .tool_config(ToolConfig::from(&settings.tools)))
    }

    /// One-line responsibility shown to the router
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// System instructions seeded into every request's history
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn server(mut self, server: ServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    pub fn servers(mut self, servers: impl IntoIterator<Item = ServerConfig>) -> Self {
        self.servers.extend(servers);
        self
    }

    /// Use an already started registry instead of launching servers
    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn max_tool_iterations(mut self, limit: usize) -> Self {
        self.max_tool_iterations = limit;
        self
    }

    pub fn tool_config(mut self, config: ToolConfig) -> Self {
        self.tool_config = config;
        self
    }

    pub fn handshake_timeout(mut self, limit: Duration) -> Self {
        self.tool_config.handshake_timeout = limit;
        self
    }

    /// Start the agent's tool servers and assemble the agent
    pub async fn build(self) -> Result<Agent> {
        let provider = self.provider.ok_or_else(|| {
            AgentError::Config(format!("agent '{}' has no completion provider", self.name))
        })?;

        let tools = match self.registry {
            Some(_) if !self.servers.is_empty() => {
                return Err(AgentError::Config(format!(
                    "agent '{}' has both a prepared registry and servers to launch",
                    self.name
                )))
            }
            Some(registry) => registry,
            None => ToolRegistry::start(&self.servers, &self.tool_config).await?,
        };

        tracing::info!(
            "[{}] Agent ready with {} tools",
            self.name,
            tools.tool_names().len()
        );

        let driver = CompletionDriver::new(provider, self.max_tool_iterations).named(self.name.clone());
        Ok(Agent {
            description: self.description.unwrap_or_default(),
            instructions: self
                .instructions
                .unwrap_or_else(|| "You are a helpful assistant.".to_string()),
            name: self.name,
            tools,
            driver,
        })
    }
}
