pub mod llm;
pub mod mcp;
pub mod protocol;
