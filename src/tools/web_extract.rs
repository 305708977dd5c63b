//! Web Extraction Tool
//!
//! Information Hiding:
//! - HTTP fetching and HTML parsing hidden
//! - Fetch failures reported as tool faults

use super::{string_arg, Tool, ToolParameter, ToolResult, ToolSignature};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use serde_json::{json, Value};
use std::time::Duration;

/// Elements whose text is never shown to a reader
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

pub struct ExtractDataFromUrlTool {
    client: Client,
}

impl ExtractDataFromUrlTool {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Tool for ExtractDataFromUrlTool {
    fn metadata(&self) -> ToolSignature {
        ToolSignature {
            name: "extract_data_from_url".to_string(),
            description: "Return all visible text from a web page, one entry per line.".to_string(),
            parameters: vec![ToolParameter::required("url", "string", "Page URL (http or https)")],
        }
    }

    fn validate(&self, args: &Value) -> Result<()> {
        let url = string_arg(args, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!("URL must start with http:// or https://"));
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let url = string_arg(&args, "url")?;
        tracing::debug!("Fetching {}", url);

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(ToolResult::failure(format!("Failed to fetch the webpage: {}", e))),
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::failure(format!(
                "Failed to fetch the webpage. Status code: {}",
                status.as_u16()
            )));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(ToolResult::failure(format!("Failed to read the webpage: {}", e))),
        };

        Ok(ToolResult::success(json!(visible_lines(&body))))
    }
}

/// Non-empty, trimmed lines of the page's visible text, in document order
pub fn visible_lines(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name().to_string()))
            .map(|name| HIDDEN_ELEMENTS.contains(&name.as_str()))
            .unwrap_or(false);
        if hidden {
            continue;
        }

        lines.extend(
            text.split('\n')
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    lines
}
