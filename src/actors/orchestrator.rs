//! Agent Orchestrator - routing a question to an agent and dispatching it
//!
//! Information Hiding:
//! - Hides the agent map and the routing step
//! - Hides customer framing of the question
//! - Exposes `handle` returning the final text or a typed error
//!
//! Per request: `Received -> Routed -> Dispatched -> {Completed | Failed}`.
//! Nothing is retried here; callers may re-issue `handle`.

use crate::actors::agent_builder::{Agent, AgentBuilder};
use crate::actors::completion_driver::DriverOutput;
use crate::actors::messages::{ResponseFragment, RoutingDecision};
use crate::actors::router_agent::{AgentProfile, Router};
use crate::config::Settings;
use crate::core::llm::CompletionProvider;
use crate::core::mcp::ChannelState;
use crate::error::{AgentError, Result};
use futures::stream::{self, BoxStream, Stream};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Routed,
    Dispatched,
    Completed,
    Failed,
}

/// Liveness of every tool channel, per agent
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub agents: Vec<AgentHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    pub agent: String,
    pub channels: Vec<ChannelHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelHealth {
    pub server: String,
    pub state: ChannelState,
    pub tools: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.agents
            .iter()
            .flat_map(|agent| agent.channels.iter())
            .all(|channel| channel.state == ChannelState::Alive)
    }
}

/// Prepend the customer identifier to the question
pub fn frame_question(question: &str, customer_id: Option<&str>) -> String {
    match customer_id {
        Some(id) => format!("Customer ID: {}. Question: '{}'", id, question),
        None => question.to_string(),
    }
}

pub struct AgentOrchestrator {
    agents: HashMap<String, Agent>,
    profiles: Vec<AgentProfile>,
    router: Router,
    fallback_agent: Option<String>,
    next_request: AtomicU64,
}

impl AgentOrchestrator {
    pub fn new(agents: Vec<Agent>, router: Router) -> Result<Self> {
        let mut map = HashMap::new();
        let mut profiles = Vec::new();
        for agent in agents {
            if map.contains_key(agent.name()) {
                return Err(AgentError::Config(format!(
                    "agent '{}' is declared twice",
                    agent.name()
                )));
            }
            profiles.push(agent.profile());
            map.insert(agent.name().to_string(), agent);
        }

        Ok(Self {
            agents: map,
            profiles,
            router,
            fallback_agent: None,
            next_request: AtomicU64::new(1),
        })
    }

    /// Agent that takes over when routing fails
    pub fn with_fallback(mut self, agent: Option<String>) -> Result<Self> {
        if let Some(name) = &agent {
            if !self.agents.contains_key(name) {
                return Err(AgentError::UnknownAgent(name.clone()));
            }
        }
        self.fallback_agent = agent;
        Ok(self)
    }

    /// Build every configured agent, starting its tool servers.
    ///
    /// If any agent fails to come up, the agents already built are closed.
    pub async fn from_settings(
        settings: &Settings,
        provider: Arc<dyn CompletionProvider>,
    ) -> Result<Self> {
        settings.validate()?;

        let mut agents: Vec<Agent> = Vec::new();
        for spec in &settings.agents {
            let built = match AgentBuilder::from_spec(spec, settings) {
                Ok(builder) => builder.provider(Arc::clone(&provider)).build().await,
                Err(e) => Err(e),
            };

            match built {
                Ok(agent) => agents.push(agent),
                Err(e) => {
                    tracing::error!("Failed to start agent '{}': {}", spec.name, e);
                    for agent in &agents {
                        if let Err(close_err) = agent.close().await {
                            tracing::warn!("{}", close_err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        Self::new(agents, Router::new(provider))?
            .with_fallback(settings.routing.fallback_agent.clone())
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    /// Agents in declaration order
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.profiles
            .iter()
            .filter_map(|profile| self.agents.get(&profile.name))
    }

    pub fn profiles(&self) -> &[AgentProfile] {
        &self.profiles
    }

    /// Answer one question, routed to the best agent
    pub async fn handle(&self, question: &str, customer_id: Option<&str>) -> Result<String> {
        self.handle_detailed(question, customer_id)
            .await
            .map(|output| output.text)
    }

    /// Like `handle`, but also returns the tool calls that were made
    pub async fn handle_detailed(
        &self,
        question: &str,
        customer_id: Option<&str>,
    ) -> Result<DriverOutput> {
        let request = self.next_request.fetch_add(1, Ordering::Relaxed);
        transition(request, RequestState::Received);

        let result = match self.route(request, question, customer_id).await {
            Ok((agent, framed)) => {
                transition(request, RequestState::Dispatched);
                agent.answer(&framed).await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(output) => {
                tracing::info!(
                    "[Orchestrator] request {} made {} tool call(s)",
                    request,
                    output.tool_calls.len()
                );
                transition(request, RequestState::Completed);
            }
            Err(e) => {
                tracing::error!("[Orchestrator] request {} failed: {}", request, e);
                transition(request, RequestState::Failed);
            }
        }
        result
    }

    /// `handle` bounded by a deadline covering routing and dispatch
    pub async fn handle_with_timeout(
        &self,
        question: &str,
        customer_id: Option<&str>,
        limit: Duration,
    ) -> Result<String> {
        match tokio::time::timeout(limit, self.handle(question, customer_id)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(limit)),
        }
    }

    /// Route, then stream the chosen agent's answer fragment by fragment
    pub async fn handle_stream<'a>(
        &'a self,
        question: &str,
        customer_id: Option<&str>,
    ) -> Result<(&'a Agent, BoxStream<'a, Result<ResponseFragment>>)> {
        let request = self.next_request.fetch_add(1, Ordering::Relaxed);
        transition(request, RequestState::Received);

        let (agent, framed) = self.route(request, question, customer_id).await.map_err(|e| {
            transition(request, RequestState::Failed);
            e
        })?;
        transition(request, RequestState::Dispatched);
        Ok((agent, settle(request, agent.answer_stream(&framed))))
    }

    async fn route(
        &self,
        request: u64,
        question: &str,
        customer_id: Option<&str>,
    ) -> Result<(&Agent, String)> {
        let framed = frame_question(question, customer_id);

        let agent_name = match self.router.decide(&framed, &self.profiles).await {
            Ok(RoutingDecision { agent, .. }) => agent,
            Err(e @ AgentError::Routing { .. }) => match &self.fallback_agent {
                Some(fallback) => {
                    tracing::warn!(
                        "[Orchestrator] request {}: {}; falling back to '{}'",
                        request,
                        e,
                        fallback
                    );
                    fallback.clone()
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };

        // The map is the source of truth, even after the router's check
        let agent = self
            .agents
            .get(&agent_name)
            .ok_or_else(|| AgentError::UnknownAgent(agent_name.clone()))?;

        tracing::info!("[Orchestrator] request {} routed to '{}'", request, agent_name);
        transition(request, RequestState::Routed);
        Ok((agent, framed))
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            agents: self
                .agents()
                .map(|agent| AgentHealth {
                    agent: agent.name().to_string(),
                    channels: agent
                        .tools()
                        .channels()
                        .iter()
                        .map(|channel| ChannelHealth {
                            server: channel.name().to_string(),
                            state: channel.state(),
                            tools: channel.signatures().iter().map(|s| s.name.clone()).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Stop every agent's tool processes. Idempotent.
    pub async fn shutdown(&self) -> Result<usize> {
        let mut stopped = 0;
        let mut first_error = None;
        for agent in self.agents() {
            match agent.close().await {
                Ok(count) => stopped += count,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        tracing::info!("[Orchestrator] Stopped {} tool process(es)", stopped);

        match first_error {
            Some(e) => Err(e),
            None => Ok(stopped),
        }
    }
}

fn transition(request: u64, state: RequestState) {
    tracing::debug!("[Orchestrator] request {} -> {:?}", request, state);
}

/// Log the terminal state once the fragment stream ends. Nothing is yielded
/// after the first error.
fn settle<'a, S>(request: u64, fragments: S) -> BoxStream<'a, Result<ResponseFragment>>
where
    S: Stream<Item = Result<ResponseFragment>> + Send + 'a,
{
    stream::unfold(Some(Box::pin(fragments)), move |fragments| async move {
        let mut fragments = fragments?;
        match fragments.next().await {
            Some(Ok(fragment)) => Some((Ok(fragment), Some(fragments))),
            Some(Err(e)) => {
                tracing::error!("[Orchestrator] request {} failed: {}", request, e);
                transition(request, RequestState::Failed);
                Some((Err(e), None))
            }
            None => {
                transition(request, RequestState::Completed);
                None
            }
        }
    })
    .boxed()
}
