use crate::error::AgentError;
use crate::tools::ToolConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LLMConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Azure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Azure resource endpoint, e.g. `https://my-resource.openai.azure.com`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

impl LLMConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_tool_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Agent that receives the request when routing fails. None surfaces the error.
    #[serde(default)]
    pub fallback_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub handshake_timeout_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 10_000,
            call_timeout_ms: 30_000,
        }
    }
}

impl From<&ToolsConfig> for ToolConfig {
    fn from(config: &ToolsConfig) -> Self {
        ToolConfig {
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// How to launch one tool process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Filled from the table key when loaded from configuration
    #[serde(default)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }
}

/// One agent as declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub instructions: String,
    #[serde(default)]
    pub servers: Vec<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        for (name, server) in settings.servers.iter_mut() {
            server.name = name.clone();
        }
        Ok(settings)
    }

    /// Credential for the configured provider
    pub fn api_key(&self) -> Result<String, AgentError> {
        let var = match self.llm.provider {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Azure => "AZURE_OPENAI_KEY",
        };
        env::var(var).map_err(|_| AgentError::Config(format!("{} environment variable not set", var)))
    }

    /// Cross-reference checks that deserialisation cannot express
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agents.is_empty() {
            return Err(AgentError::Config("no agents configured".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.name.as_str()) {
                return Err(AgentError::Config(format!(
                    "agent '{}' is declared twice",
                    agent.name
                )));
            }
            for server in &agent.servers {
                if !self.servers.contains_key(server) {
                    return Err(AgentError::Config(format!(
                        "agent '{}' references unknown server '{}'",
                        agent.name, server
                    )));
                }
            }
        }

        if let Some(fallback) = &self.routing.fallback_agent {
            if !seen.contains(fallback.as_str()) {
                return Err(AgentError::Config(format!(
                    "fallback agent '{}' is not declared",
                    fallback
                )));
            }
        }

        if self.llm.provider == ProviderKind::Azure
            && (self.llm.endpoint.is_none() || self.llm.deployment.is_none())
        {
            return Err(AgentError::Config(
                "azure provider needs llm.endpoint and llm.deployment".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(text: &str) -> Settings {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .unwrap();
        config.try_deserialize().unwrap()
    }

    const BASE: &str = r#"
        [llm]
        model = "gpt-4o-mini"
        max_tokens = 1024
        temperature = 0.0

        [servers.calculator]
        command = "calculator-server"

        [[agents]]
        name = "Calc"
        description = "Arithmetic"
        instructions = "Use the calculator."
        servers = ["calculator"]
    "#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let settings = from_toml(BASE);

        assert_eq!(settings.llm.provider, ProviderKind::OpenAi);
        assert_eq!(settings.agent.max_tool_iterations, 5);
        assert_eq!(settings.tools.call_timeout_ms, 30_000);
        assert!(settings.routing.fallback_agent.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_server_reference_is_rejected() {
        let mut settings = from_toml(BASE);
        settings.agents[0].servers.push("weather".to_string());

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("unknown server 'weather'"));
    }

    #[test]
    fn test_azure_needs_endpoint() {
        let mut settings = from_toml(BASE);
        settings.llm.provider = ProviderKind::Azure;
        assert!(settings.validate().is_err());

        settings.llm.endpoint = Some("https://example.openai.azure.com".to_string());
        settings.llm.deployment = Some("gpt-4o".to_string());
        assert!(settings.validate().is_ok());
    }
}
