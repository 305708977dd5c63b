//! Router - model-driven choice of the agent that handles a request
//!
//! Information Hiding:
//! - Hides the routing prompt and the structured output schema
//! - Hides the strict decode of the model's decision
//! - Exposes a single `decide` call; fallback policy belongs to the caller

use crate::actors::completion_driver::CompletionDriver;
use crate::actors::messages::{MessageHistory, RoutingDecision};
use crate::core::llm::{CompletionProvider, JsonSchemaFormat, ResponseFormat};
use crate::error::{AgentError, Result};
use crate::tools::registry::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Name and one-line responsibility of a candidate agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Classifies a question onto one of several named agents
pub struct Router {
    provider: Arc<dyn CompletionProvider>,
    // Always empty: the router never calls tools
    tools: ToolRegistry,
}

impl Router {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            tools: ToolRegistry::new(),
        }
    }

    /// Ask the model which agent should answer `question`.
    ///
    /// Fails with `Routing` when the reply is not exactly a decision object
    /// or names an agent outside `agents`.
    pub async fn decide(&self, question: &str, agents: &[AgentProfile]) -> Result<RoutingDecision> {
        if agents.is_empty() {
            return Err(AgentError::routing("no agents to route between", None));
        }

        tracing::info!("[Router] Routing question: {}", question);

        let driver = CompletionDriver::new(Arc::clone(&self.provider), 0)
            .named("Router")
            .with_response_format(decision_format(agents));
        let mut history = MessageHistory::new(routing_prompt(agents)).with_user(question);

        let output = match driver.run(&mut history, &self.tools).await {
            Ok(output) => output,
            Err(AgentError::ToolLoopExceeded { .. }) => {
                return Err(AgentError::routing(
                    "model requested a tool instead of a decision",
                    None,
                ))
            }
            Err(e) => return Err(e),
        };

        let decision = parse_decision(&output.text, agents)?;
        tracing::info!("[Router] Routing to '{}'", decision.agent);
        Ok(decision)
    }
}

fn routing_prompt(agents: &[AgentProfile]) -> String {
    let listing = agents
        .iter()
        .map(|agent| format!("- {}: {}", agent.name, agent.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a router that decides which specialized agent should handle a user request.\n\n\
         Available Agents:\n{}\n\n\
         Respond with a JSON object with exactly two fields:\n\
         {{\"agent\": \"<one of the agent names above>\", \"question\": \"<the question to forward>\"}}\n\n\
         Respond with valid JSON only. No extra text.",
        listing
    )
}

fn decision_format(agents: &[AgentProfile]) -> ResponseFormat {
    let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
    ResponseFormat::JsonSchema {
        json_schema: JsonSchemaFormat {
            name: "routing_decision".to_string(),
            description: Some("The agent that should handle the request".to_string()),
            schema: json!({
                "type": "object",
                "properties": {
                    "agent": {"type": "string", "enum": names},
                    "question": {"type": "string"}
                },
                "required": ["agent", "question"],
                "additionalProperties": false
            }),
            strict: true,
        },
    }
}

fn parse_decision(raw: &str, agents: &[AgentProfile]) -> Result<RoutingDecision> {
    let decision: RoutingDecision = serde_json::from_str(raw.trim()).map_err(|e| {
        AgentError::routing(format!("invalid routing decision: {}", e), Some(raw.to_string()))
    })?;

    if !agents.iter().any(|agent| agent.name == decision.agent) {
        return Err(AgentError::routing(
            format!("decision names unknown agent '{}'", decision.agent),
            Some(raw.to_string()),
        ));
    }

    Ok(decision)
}
