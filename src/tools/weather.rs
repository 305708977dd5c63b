//! Weather Tool - fixed demo data

use super::{string_arg, Tool, ToolParameter, ToolResult, ToolSignature};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub struct GetWeatherTool;

#[async_trait]
impl Tool for GetWeatherTool {
    fn metadata(&self) -> ToolSignature {
        ToolSignature {
            name: "get_weather".to_string(),
            description: "Return the current weather for a given city. Only 'boston' is supported."
                .to_string(),
            parameters: vec![ToolParameter::required("city", "string", "City name")],
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let city = string_arg(&args, "city")?;
        let report = if city.trim().eq_ignore_ascii_case("boston") {
            "The current temperature in Boston is 68°F."
        } else {
            "Sorry, I only have weather data for Boston."
        };
        Ok(ToolResult::success(report))
    }
}
