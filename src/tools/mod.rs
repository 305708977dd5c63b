//! Tool System - signatures, results and the tool-process side of the protocol
//!
//! Information Hiding:
//! - Tool execution details hidden behind the `Tool` trait
//! - Wire schema conversion hidden inside `ToolSignature`
//! - Which process owns which tool is hidden by the registry

pub mod calculator;
pub mod customer;
pub mod knowledge_base;
pub mod registry;
pub mod server;
pub mod weather;
pub mod web_extract;

use crate::error::ErrorKind;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;

/// Tool parameter schema definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: String,
    pub description: String,
    pub required: bool,
}

impl ToolParameter {
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// Tool signature - describes what a tool does and how to call it.
///
/// Published by a tool process during the handshake and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSignature {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSignature {
    /// Build a signature from a JSON-schema `inputSchema` object.
    ///
    /// Parameter order follows the order of `properties` in the schema.
    pub fn from_input_schema(name: String, description: String, input_schema: &Value) -> Self {
        let required: Vec<&str> = input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let parameters = input_schema
            .get("properties")
            .and_then(|props| props.as_object())
            .map(|obj| {
                obj.iter()
                    .map(|(param_name, schema)| ToolParameter {
                        name: param_name.clone(),
                        param_type: schema
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("string")
                            .to_string(),
                        description: schema
                            .get("description")
                            .and_then(|d| d.as_str())
                            .unwrap_or("")
                            .to_string(),
                        required: required.contains(&param_name.as_str()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name,
            description,
            parameters,
        }
    }

    /// JSON-schema form used on the wire and in completion requests
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut schema = Map::new();
            schema.insert("type".to_string(), json!(param.param_type));
            if !param.description.is_empty() {
                schema.insert("description".to_string(), json!(param.description));
            }
            properties.insert(param.name.clone(), Value::Object(schema));
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl fmt::Display for ToolSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

/// Outcome of one tool call: a success value or a structured error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { value: Value },
    Failure { error: String },
}

impl ToolResult {
    pub fn success(value: impl Into<Value>) -> Self {
        ToolResult::Success {
            value: value.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ToolResult::Failure {
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// `ToolFault` for a failure, `None` for a success
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Failure { .. } => Some(ErrorKind::ToolFault),
        }
    }

    /// Text shown to the completion capability in the tool-role message
    pub fn to_observation(&self) -> String {
        match self {
            ToolResult::Success {
                value: Value::String(s),
            } => s.clone(),
            ToolResult::Success { value } => value.to_string(),
            ToolResult::Failure { error } => format!("Error: {}", error),
        }
    }
}

/// Tool trait - implemented by tools hosted inside a tool process
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get tool signature (name, description, parameters)
    fn metadata(&self) -> ToolSignature;

    /// Execute the tool with given arguments.
    ///
    /// Application errors are returned as `ToolResult::Failure`; `Err` is kept
    /// for failures of the tool machinery itself.
    async fn execute(&self, args: Value) -> Result<ToolResult>;

    /// Validate arguments before execution
    fn validate(&self, args: &Value) -> Result<()> {
        let metadata = self.metadata();
        let obj = args
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("arguments for '{}' must be an object", metadata.name))?;

        for param in metadata.parameters.iter().filter(|p| p.required) {
            if !obj.contains_key(&param.name) {
                return Err(anyhow::anyhow!(
                    "'{}' parameter is required",
                    param.name
                ));
            }
        }
        Ok(())
    }
}

/// Timeouts applied by tool channels
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub handshake_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Read a numeric argument, accepting numbers and numeric strings
pub(crate) fn number_arg(args: &Value, name: &str) -> Result<f64> {
    match &args[name] {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| anyhow::anyhow!("'{}' is not a finite number", name)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow::anyhow!("'{}' must be a number, got '{}'", name, s)),
        _ => Err(anyhow::anyhow!("'{}' parameter is required and must be a number", name)),
    }
}

/// Read a string argument
pub(crate) fn string_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args[name]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("'{}' parameter is required and must be a string", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_schema_preserves_parameter_order() {
        let schema = json!({
            "type": "object",
            "properties": {
                "y": {"type": "number", "description": "second"},
                "x": {"type": "number"},
                "label": {"type": "string"}
            },
            "required": ["y", "x"]
        });

        let sig = ToolSignature::from_input_schema(
            "combine".to_string(),
            "Combine things".to_string(),
            &schema,
        );

        let names: Vec<&str> = sig.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["y", "x", "label"]);
        assert!(sig.parameters[0].required);
        assert!(!sig.parameters[2].required);
        assert_eq!(sig.parameters[0].description, "second");

        let back = ToolSignature::from_input_schema(
            sig.name.clone(),
            sig.description.clone(),
            &sig.input_schema(),
        );
        assert_eq!(back, sig);
    }

    #[test]
    fn test_tool_result_observation() {
        assert_eq!(ToolResult::success("9").to_observation(), "9");
        assert_eq!(ToolResult::success(json!(9.0)).to_observation(), "9.0");
        assert_eq!(
            ToolResult::failure("Cannot divide by zero").to_observation(),
            "Error: Cannot divide by zero"
        );
        assert!(!ToolResult::failure("x").is_ok());
    }

    #[test]
    fn test_failure_is_tagged_as_tool_fault() {
        assert_eq!(
            ToolResult::failure("Cannot divide by zero").error_kind(),
            Some(ErrorKind::ToolFault)
        );
        assert_eq!(ToolResult::success("9").error_kind(), None);
        assert_eq!(ErrorKind::ToolFault.to_string(), "tool_fault");
    }

    #[test]
    fn test_number_arg_accepts_strings() {
        let args = json!({"x": "4", "y": 5});
        assert_eq!(number_arg(&args, "x").unwrap(), 4.0);
        assert_eq!(number_arg(&args, "y").unwrap(), 5.0);
        assert!(number_arg(&args, "z").is_err());
    }
}
