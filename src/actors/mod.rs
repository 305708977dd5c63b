pub mod agent_builder;
pub mod completion_driver;
pub mod mcp_actor;
pub mod messages;
pub mod orchestrator;
pub mod router_agent;

pub use agent_builder::{Agent, AgentBuilder};
pub use orchestrator::AgentOrchestrator;
