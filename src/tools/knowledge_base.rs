//! Signal Quality Knowledge Base
//!
//! Information Hiding:
//! - Report layout (`datos.signalQualityIssuesDetail.detailSignalPlane`) hidden
//!   behind `SignalReportStore`
//! - Exposes a single query: the signal-plane entry for an IMSI

use super::{string_arg, Tool, ToolParameter, ToolResult, ToolSignature};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Signal-plane entries keyed by IMSI
#[derive(Debug, Default)]
pub struct SignalReportStore {
    entries: HashMap<String, Value>,
}

impl SignalReportStore {
    /// Load a signal quality report exported as JSON
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read signal report from {}", path.display()))?;
        let document: Value = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON document", path.display()))?;
        Ok(Self::from_document(&document))
    }

    /// Index every entry that carries an IMSI. A document without the
    /// signal-plane section yields an empty store; a repeated IMSI keeps the
    /// last entry.
    pub fn from_document(document: &Value) -> Self {
        let plane = document
            .pointer("/datos/signalQualityIssuesDetail/detailSignalPlane")
            .and_then(Value::as_array);

        let mut entries = HashMap::new();
        for entry in plane.into_iter().flatten() {
            if let Some(imsi) = imsi_key(&entry["imsi"]) {
                entries.insert(imsi, entry.clone());
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_imsi(&self, imsi: &str) -> Option<&Value> {
        self.entries.get(imsi.trim())
    }
}

fn imsi_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct GetCustomerByImsiTool {
    store: Arc<SignalReportStore>,
}

impl GetCustomerByImsiTool {
    pub fn new(store: Arc<SignalReportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetCustomerByImsiTool {
    fn metadata(&self) -> ToolSignature {
        ToolSignature {
            name: "get_customer_by_imsi".to_string(),
            description: "Retrieve customer information by IMSI.".to_string(),
            parameters: vec![ToolParameter::required(
                "imsi",
                "string",
                "Subscriber IMSI",
            )],
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let imsi = match &args["imsi"] {
            Value::Number(n) => n.to_string(),
            _ => string_arg(&args, "imsi")?.to_string(),
        };

        Ok(match self.store.by_imsi(&imsi) {
            Some(entry) => ToolResult::success(entry.clone()),
            None => ToolResult::success(json!({
                "error": format!("Customer with IMSI {} not found.", imsi)
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn report_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "datos": {{
                    "signalQualityIssuesDetail": {{
                        "detailSignalPlane": [
                            {{"imsi": "730011234567890", "rsrp": -112, "issue": "weak coverage"}},
                            {{"imsi": 730019876543210, "rsrp": -85, "issue": "none"}},
                            {{"rsrp": -90}}
                        ]
                    }}
                }}
            }}"#
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_lookup_by_imsi() {
        let file = report_file();
        let store = Arc::new(SignalReportStore::load(file.path()).await.unwrap());
        assert_eq!(store.len(), 2);
        let tool = GetCustomerByImsiTool::new(store);

        let found = tool
            .execute(json!({"imsi": "730011234567890"}))
            .await
            .unwrap();
        match found {
            ToolResult::Success { value } => assert_eq!(value["issue"], "weak coverage"),
            other => panic!("unexpected {:?}", other),
        }

        let numeric = tool.execute(json!({"imsi": 730019876543210u64})).await.unwrap();
        assert!(numeric.to_observation().contains("-85"));

        let missing = tool.execute(json!({"imsi": "000"})).await.unwrap();
        assert_eq!(
            missing,
            ToolResult::success(json!({"error": "Customer with IMSI 000 not found."}))
        );
    }

    #[test]
    fn test_document_without_signal_plane_is_empty() {
        let store = SignalReportStore::from_document(&json!({"datos": {}}));
        assert!(store.is_empty());
    }

    #[test]
    fn test_repeated_imsi_keeps_last_entry() {
        let store = SignalReportStore::from_document(&json!({
            "datos": {"signalQualityIssuesDetail": {"detailSignalPlane": [
                {"imsi": "1", "rsrp": -100},
                {"imsi": "1", "rsrp": -80}
            ]}}
        }));
        assert_eq!(store.by_imsi("1").unwrap()["rsrp"], json!(-80));
    }

    #[test]
    fn test_missing_imsi_argument_is_error() {
        let store = Arc::new(SignalReportStore::default());
        let tool = GetCustomerByImsiTool::new(store);
        assert!(tool.validate(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        assert!(SignalReportStore::load("/nonexistent/signal.json").await.is_err());
    }
}
