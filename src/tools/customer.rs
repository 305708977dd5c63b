//! Customer Lookup Tools
//!
//! Information Hiding:
//! - Record storage (pre-loaded JSON file) hidden behind `CustomerStore`
//! - Exposes read-only queries: by id, by partial name, all records

use super::{string_arg, Tool, ToolParameter, ToolResult, ToolSignature};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Display-name fields, in lookup order
const NAME_FIELDS: [&str; 2] = ["nombre", "name"];

/// Read-only customer table
#[derive(Debug, Default)]
pub struct CustomerStore {
    records: Vec<Value>,
    by_id: HashMap<String, usize>,
}

impl CustomerStore {
    /// Load a JSON array of customer records
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read customer data from {}", path.display()))?;
        let records: Vec<Value> = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON array of records", path.display()))?;
        Self::from_records(records)
    }

    pub fn from_records(records: Vec<Value>) -> Result<Self> {
        let mut by_id = HashMap::new();
        for (slot, record) in records.iter().enumerate() {
            let id = record_id(record)
                .ok_or_else(|| anyhow::anyhow!("record {} has no customer_id", slot))?;
            if by_id.insert(id.clone(), slot).is_some() {
                anyhow::bail!("customer_id '{}' appears twice", id);
            }
        }
        Ok(Self { records, by_id })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact match on the identifier
    pub fn by_id(&self, id: &str) -> Option<&Value> {
        self.by_id.get(id.trim()).map(|&slot| &self.records[slot])
    }

    /// Case-insensitive substring match on the display name
    pub fn find_by_name(&self, partial: &str) -> Vec<&Value> {
        let partial = partial.to_lowercase();
        self.records
            .iter()
            .filter(|record| {
                display_name(record)
                    .map(|name| name.to_lowercase().contains(&partial))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn all(&self) -> &[Value] {
        &self.records
    }
}

fn record_id(record: &Value) -> Option<String> {
    match &record["customer_id"] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn display_name(record: &Value) -> Option<&str> {
    NAME_FIELDS
        .iter()
        .find_map(|field| record.get(*field).and_then(|v| v.as_str()))
}

pub struct GetCustomerByIdTool {
    store: Arc<CustomerStore>,
}

impl GetCustomerByIdTool {
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetCustomerByIdTool {
    fn metadata(&self) -> ToolSignature {
        ToolSignature {
            name: "get_customer_by_id".to_string(),
            description: "Retrieve customer information by customer ID.".to_string(),
            parameters: vec![ToolParameter::required(
                "customer_id",
                "string",
                "Exact customer identifier",
            )],
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let id = match &args["customer_id"] {
            Value::Number(n) => n.to_string(),
            _ => string_arg(&args, "customer_id")?.to_string(),
        };

        // Not-found is an answer, not a fault
        Ok(match self.store.by_id(&id) {
            Some(record) => ToolResult::success(record.clone()),
            None => ToolResult::success(json!({
                "error": format!("Customer with ID {} not found.", id)
            })),
        })
    }
}

pub struct FindCustomersByNameTool {
    store: Arc<CustomerStore>,
}

impl FindCustomersByNameTool {
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindCustomersByNameTool {
    fn metadata(&self) -> ToolSignature {
        ToolSignature {
            name: "find_customers_by_name".to_string(),
            description: "Find customers whose name contains the given text (case-insensitive)."
                .to_string(),
            parameters: vec![ToolParameter::required(
                "partial_name",
                "string",
                "Part of the customer's name",
            )],
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let partial = string_arg(&args, "partial_name")?;
        let matches: Vec<Value> = self
            .store
            .find_by_name(partial)
            .into_iter()
            .cloned()
            .collect();
        Ok(ToolResult::success(Value::Array(matches)))
    }
}

pub struct GetAllCustomersTool {
    store: Arc<CustomerStore>,
}

impl GetAllCustomersTool {
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetAllCustomersTool {
    fn metadata(&self) -> ToolSignature {
        ToolSignature {
            name: "get_all_customers".to_string(),
            description: "Return a list of all customers.".to_string(),
            parameters: vec![],
        }
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult> {
        Ok(ToolResult::success(Value::Array(self.store.all().to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn data_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"customer_id": "C001", "nombre": "María García", "plan": "Fibra 600Mb"}},
                {{"customer_id": "C002", "nombre": "Juan Pérez", "plan": "Móvil 20GB"}},
                {{"customer_id": 3, "name": "Mariano Ruiz", "plan": "TV"}}
            ]"#
        )
        .unwrap();
        file
    }

    async fn store() -> Arc<CustomerStore> {
        let file = data_file();
        Arc::new(CustomerStore::load(file.path()).await.unwrap())
    }

    #[tokio::test]
    async fn test_lookup_by_id() {
        let tool = GetCustomerByIdTool::new(store().await);

        let found = tool.execute(json!({"customer_id": "C002"})).await.unwrap();
        match found {
            ToolResult::Success { value } => assert_eq!(value["nombre"], "Juan Pérez"),
            other => panic!("unexpected {:?}", other),
        }

        let numeric = tool.execute(json!({"customer_id": 3})).await.unwrap();
        assert!(numeric.to_observation().contains("Mariano"));

        let missing = tool.execute(json!({"customer_id": "C999"})).await.unwrap();
        assert_eq!(
            missing,
            ToolResult::success(json!({"error": "Customer with ID C999 not found."}))
        );
    }

    #[tokio::test]
    async fn test_partial_name_is_case_insensitive() {
        let tool = FindCustomersByNameTool::new(store().await);

        let result = tool.execute(json!({"partial_name": "MARI"})).await.unwrap();
        match result {
            ToolResult::Success { value } => {
                let ids: Vec<&Value> = value
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|r| &r["customer_id"])
                    .collect();
                assert_eq!(ids, vec![&json!("C001"), &json!(3)]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let none = tool.execute(json!({"partial_name": "zzz"})).await.unwrap();
        assert_eq!(none, ToolResult::success(json!([])));
    }

    #[tokio::test]
    async fn test_all_customers_in_file_order() {
        let tool = GetAllCustomersTool::new(store().await);
        let result = tool.execute(json!({})).await.unwrap();
        match result {
            ToolResult::Success { value } => assert_eq!(value.as_array().unwrap().len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let records = vec![json!({"customer_id": "A"}), json!({"customer_id": "A"})];
        assert!(CustomerStore::from_records(records).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        assert!(CustomerStore::load("/nonexistent/customers.json").await.is_err());
    }
}
