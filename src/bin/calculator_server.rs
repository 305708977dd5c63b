use anyhow::Result;
use mcp_orchestra::tools::calculator::{
    AddNumbersTool, DivideNumbersTool, MultiplyNumbersTool, SubtractNumbersTool,
};
use mcp_orchestra::tools::server::ToolServer;
use mcp_orchestra::utils;

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_server_logging();

    ToolServer::new("calculator")
        .tool(AddNumbersTool)
        .tool(SubtractNumbersTool)
        .tool(MultiplyNumbersTool)
        .tool(DivideNumbersTool)
        .serve_stdio()
        .await
}
