use anyhow::Result;
use mcp_orchestra::tools::customer::{
    CustomerStore, FindCustomersByNameTool, GetAllCustomersTool, GetCustomerByIdTool,
};
use mcp_orchestra::tools::server::ToolServer;
use mcp_orchestra::utils;
use std::sync::Arc;

const DEFAULT_DATA: &str = "data/customers.json";

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_server_logging();

    // First argument, then CUSTOMER_DATA, then the bundled sample
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CUSTOMER_DATA").ok())
        .unwrap_or_else(|| DEFAULT_DATA.to_string());

    let store = Arc::new(CustomerStore::load(&path).await?);
    tracing::info!("Loaded {} customer records from {}", store.len(), path);

    ToolServer::new("customer")
        .tool(GetCustomerByIdTool::new(Arc::clone(&store)))
        .tool(FindCustomersByNameTool::new(Arc::clone(&store)))
        .tool(GetAllCustomersTool::new(store))
        .serve_stdio()
        .await
}
