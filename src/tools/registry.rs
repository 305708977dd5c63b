//! Tool Registry
//!
//! Information Hiding:
//! - Which channel owns which tool is hidden behind `invoke`
//! - Channel lifecycle (start, teardown on partial failure, close) hidden
//! - Consumers only see the merged signature set

use super::{ToolConfig, ToolResult, ToolSignature};
use crate::actors::messages::ToolCall;
use crate::config::ServerConfig;
use crate::core::mcp::ToolChannel;
use crate::error::{AgentError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Aggregates tool channels into one addressable capability set.
///
/// Owns its channels exclusively; every channel is stopped by `close`, or
/// killed when the registry is dropped.
pub struct ToolRegistry {
    channels: Vec<ToolChannel>,
    index: HashMap<String, usize>,
    closed: AtomicBool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            index: HashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Start one channel per server and register them all.
    ///
    /// If any server fails to start or clashes with an earlier one, every
    /// channel started so far is stopped before the error is returned.
    pub async fn start(servers: &[ServerConfig], config: &ToolConfig) -> Result<Self> {
        let mut registry = Self::new();

        for server in servers {
            let mut channel = ToolChannel::new(server.clone(), config.clone());

            let started = match channel.start().await {
                Ok(()) => registry.check_conflicts(&channel),
                Err(e) => Err(e),
            };

            if let Err(e) = started {
                tracing::error!("Failed to bring up tool server '{}': {}", server.name, e);
                if let Err(stop_err) = channel.stop().await {
                    tracing::warn!("{}", stop_err);
                }
                if let Err(close_err) = registry.close().await {
                    tracing::warn!("{}", close_err);
                }
                return Err(e);
            }

            if let Err(e) = registry.register(channel) {
                if let Err(close_err) = registry.close().await {
                    tracing::warn!("{}", close_err);
                }
                return Err(e);
            }
        }

        Ok(registry)
    }

    /// Register a started channel and merge its signatures
    pub fn register(&mut self, channel: ToolChannel) -> Result<()> {
        if !channel.is_alive() {
            return Err(AgentError::ChannelClosed {
                server: channel.name().to_string(),
            });
        }
        self.check_conflicts(&channel)?;

        let slot = self.channels.len();
        for signature in channel.signatures() {
            tracing::info!("Registering tool: {} ({})", signature.name, channel.name());
            self.index.insert(signature.name.clone(), slot);
        }
        self.channels.push(channel);
        Ok(())
    }

    fn check_conflicts(&self, channel: &ToolChannel) -> Result<()> {
        let mut incoming = HashSet::new();
        for signature in channel.signatures() {
            let existing = match self.index.get(&signature.name) {
                Some(&slot) => Some(self.channels[slot].name().to_string()),
                None if !incoming.insert(signature.name.as_str()) => {
                    Some(channel.name().to_string())
                }
                None => None,
            };

            if let Some(existing) = existing {
                return Err(AgentError::DuplicateTool {
                    tool: signature.name.clone(),
                    existing,
                    incoming: channel.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Route a call to the channel that advertised the tool
    pub async fn invoke(&self, call: &ToolCall) -> Result<ToolResult> {
        let slot = self
            .index
            .get(&call.name)
            .copied()
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;

        self.channels[slot]
            .call(&call.name, Value::Object(call.arguments.clone()))
            .await
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All signatures, in registration order
    pub fn signatures(&self) -> Vec<ToolSignature> {
        self.channels
            .iter()
            .flat_map(|channel| channel.signatures().iter().cloned())
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.signatures().into_iter().map(|s| s.name).collect()
    }

    pub fn channels(&self) -> &[ToolChannel] {
        &self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get tool signatures as formatted string for prompts and listings
    pub fn tools_description(&self) -> String {
        let mut descriptions = Vec::new();
        for signature in self.signatures() {
            let params = signature
                .parameters
                .iter()
                .map(|p| {
                    let required = if p.required { "required" } else { "optional" };
                    format!("  - {} ({}): {} [{}]", p.name, p.param_type, p.description, required)
                })
                .collect::<Vec<_>>()
                .join("\n");

            descriptions.push(format!(
                "Tool: {}\nDescription: {}\nParameters:\n{}",
                signature.name, signature.description, params
            ));
        }
        descriptions.join("\n\n")
    }

    /// Stop every owned channel. Idempotent: returns how many processes this
    /// call stopped. All channels are stopped even if one fails; the first
    /// error is returned.
    pub async fn close(&self) -> Result<usize> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(0);
        }

        let mut stopped = 0;
        let mut first_error = None;
        for channel in &self.channels {
            match channel.stop().await {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to stop '{}': {}", channel.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(stopped),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
