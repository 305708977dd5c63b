use anyhow::Result;
use mcp_orchestra::tools::server::ToolServer;
use mcp_orchestra::tools::weather::GetWeatherTool;
use mcp_orchestra::utils;

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_server_logging();

    ToolServer::new("weather")
        .tool(GetWeatherTool)
        .serve_stdio()
        .await
}
