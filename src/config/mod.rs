mod settings;

pub use settings::{
    AgentConfig, AgentSpec, LLMConfig, LoggingConfig, ProviderKind, RoutingConfig, ServerConfig,
    Settings, ToolsConfig,
};
