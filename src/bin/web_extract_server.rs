use anyhow::Result;
use mcp_orchestra::tools::server::ToolServer;
use mcp_orchestra::tools::web_extract::ExtractDataFromUrlTool;
use mcp_orchestra::utils;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_server_logging();

    ToolServer::new("web-extract")
        .tool(ExtractDataFromUrlTool::new(Duration::from_secs(20))?)
        .serve_stdio()
        .await
}
