use anyhow::Result;
use mcp_orchestra::tools::knowledge_base::{GetCustomerByImsiTool, SignalReportStore};
use mcp_orchestra::tools::server::ToolServer;
use mcp_orchestra::utils;
use std::sync::Arc;

const DEFAULT_DATA: &str = "data/signal_quality.json";

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_server_logging();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("KNOWLEDGE_BASE_DATA").ok())
        .unwrap_or_else(|| DEFAULT_DATA.to_string());

    let store = Arc::new(SignalReportStore::load(&path).await?);
    tracing::info!("Indexed {} signal-plane entries from {}", store.len(), path);

    ToolServer::new("knowledge_base")
        .tool(GetCustomerByImsiTool::new(store))
        .serve_stdio()
        .await
}
