//! Calculator Tools
//!
//! Information Hiding:
//! - Argument coercion (numbers or numeric strings) hidden
//! - Division by zero reported as a tool fault, not an error

use super::{number_arg, Tool, ToolParameter, ToolResult, ToolSignature};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

fn operands() -> Vec<ToolParameter> {
    vec![
        ToolParameter::required("x", "number", "First operand"),
        ToolParameter::required("y", "number", "Second operand"),
    ]
}

fn signature(name: &str, description: &str) -> ToolSignature {
    ToolSignature {
        name: name.to_string(),
        description: description.to_string(),
        parameters: operands(),
    }
}

fn pair(args: &Value) -> Result<(f64, f64)> {
    Ok((number_arg(args, "x")?, number_arg(args, "y")?))
}

/// Sum of two numbers, with the computation spelled out
pub struct AddNumbersTool;

#[async_trait]
impl Tool for AddNumbersTool {
    fn metadata(&self) -> ToolSignature {
        signature(
            "add_numbers",
            "Add two numbers and return the result as a string with computation details.",
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let (x, y) = pair(&args)?;
        Ok(ToolResult::success(format!(
            "The computation is: {} + {} = {}",
            x,
            y,
            x + y
        )))
    }
}

pub struct SubtractNumbersTool;

#[async_trait]
impl Tool for SubtractNumbersTool {
    fn metadata(&self) -> ToolSignature {
        signature(
            "subtract_numbers",
            "Subtract the second number from the first number.",
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let (x, y) = pair(&args)?;
        Ok(ToolResult::success(json!(x - y)))
    }
}

pub struct MultiplyNumbersTool;

#[async_trait]
impl Tool for MultiplyNumbersTool {
    fn metadata(&self) -> ToolSignature {
        signature("multiply_numbers", "Multiply two numbers together.")
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let (x, y) = pair(&args)?;
        Ok(ToolResult::success(json!(x * y)))
    }
}

pub struct DivideNumbersTool;

#[async_trait]
impl Tool for DivideNumbersTool {
    fn metadata(&self) -> ToolSignature {
        signature(
            "divide_numbers",
            "Divide the first number by the second number.",
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let (x, y) = pair(&args)?;
        if y == 0.0 {
            return Ok(ToolResult::failure("Cannot divide by zero"));
        }
        Ok(ToolResult::success(json!(x / y)))
    }
}
