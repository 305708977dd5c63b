//! Integration tests against the real tool-server binaries
//!
//! No API keys needed: the completion service is either scripted in-process
//! or served by wiremock.

use async_trait::async_trait;
use mcp_orchestra::core::llm::ChunkStream;
use mcp_orchestra::{
    Agent, AgentError, AgentOrchestrator, CompletionChunk, CompletionProvider,
    CompletionRequest, ErrorKind, HandleRequest, LLMConfig, OpenAiCompletion, ProviderKind,
    Role, Router, ServerConfig, ToolCall, ToolConfig, ToolRegistry, ToolResult,
};
use serde_json::json;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

fn calculator() -> ServerConfig {
    ServerConfig::new("calculator", env!("CARGO_BIN_EXE_calculator-server"), vec![])
}

fn weather() -> ServerConfig {
    ServerConfig::new("weather", env!("CARGO_BIN_EXE_weather-server"), vec![])
}

fn tool_config() -> ToolConfig {
    ToolConfig {
        handshake_timeout: Duration::from_secs(10),
        call_timeout: Duration::from_secs(10),
    }
}

/// Replays canned turns in order
struct Scripted {
    turns: Mutex<VecDeque<Vec<CompletionChunk>>>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl Scripted {
    fn new(turns: Vec<Vec<CompletionChunk>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn text(answer: &str) -> Arc<Self> {
        Self::new(vec![vec![CompletionChunk::Text(answer.to_string())]])
    }

    fn seen(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for Scripted {
    async fn complete(&self, request: CompletionRequest) -> mcp_orchestra::Result<ChunkStream> {
        self.seen.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::Completion("script exhausted".to_string()))?;
        Ok(Box::pin(futures::stream::iter(turn.into_iter().map(Ok))))
    }
}

fn call(id: &str, name: &str, arguments: serde_json::Value) -> CompletionChunk {
    CompletionChunk::ToolCall(ToolCall::new(id, name, arguments))
}

#[tokio::test]
async fn test_end_to_end_two_tool_calls() {
    let registry = ToolRegistry::start(&[calculator(), weather()], &tool_config())
        .await
        .unwrap();
    assert!(registry.has_tool("add_numbers"));
    assert!(registry.has_tool("subtract_numbers"));
    assert!(registry.has_tool("get_weather"));

    let assistant = Scripted::new(vec![
        vec![
            call("call_add", "add_numbers", json!({"x": 4, "y": 5})),
            call("call_weather", "get_weather", json!({"city": "boston"})),
        ],
        vec![
            CompletionChunk::Text("4 plus 5 is 9. ".to_string()),
            CompletionChunk::Text("It is 68°F in Boston.".to_string()),
        ],
    ]);
    let agent = Agent::builder("Assistant")
        .description("Arithmetic and weather")
        .instructions("Use your tools.")
        .registry(registry)
        .provider(assistant.clone())
        .build()
        .await
        .unwrap();

    let router = Router::new(Scripted::text(
        r#"{"agent":"Assistant","question":"what is 4 plus 5 and the weather"}"#,
    ));
    let orchestrator = AgentOrchestrator::new(vec![agent], router).unwrap();

    let output = orchestrator
        .handle_detailed("what is 4 plus 5 and the weather", None)
        .await
        .unwrap();

    assert_eq!(output.tool_calls.len(), 2);
    assert_eq!(
        output.tool_calls[0].result,
        ToolResult::success("The computation is: 4 + 5 = 9")
    );
    assert_eq!(
        output.tool_calls[1].result,
        ToolResult::success("The current temperature in Boston is 68°F.")
    );
    assert!(!output.text.is_empty());

    // Both results were shown to the model before its final turn
    let final_request = &assistant.seen()[1];
    let tool_messages: Vec<_> = final_request
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call_add"));

    assert_eq!(orchestrator.shutdown().await.unwrap(), 2);
    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
}

#[tokio::test]
async fn test_division_by_zero_is_shown_to_model() {
    let registry = ToolRegistry::start(&[calculator()], &tool_config()).await.unwrap();

    let result = registry
        .invoke(&ToolCall::new("c1", "divide_numbers", json!({"x": 1, "y": 0})))
        .await
        .unwrap();
    assert_eq!(result, ToolResult::failure("Cannot divide by zero"));

    // The channel survives an application fault
    let result = registry
        .invoke(&ToolCall::new("c2", "multiply_numbers", json!({"x": 6, "y": 7})))
        .await
        .unwrap();
    assert_eq!(result, ToolResult::success(json!(42.0)));

    assert_eq!(registry.close().await.unwrap(), 1);
    assert_eq!(registry.close().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unregistered_tool_is_unknown() {
    let registry = ToolRegistry::start(&[weather()], &tool_config()).await.unwrap();

    let err = registry
        .invoke(&ToolCall::new("c1", "add_numbers", json!({"x": 1, "y": 2})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTool);
    assert!(registry.channels()[0].is_alive());

    registry.close().await.unwrap();
}

#[tokio::test]
async fn test_second_server_failure_tears_down_first() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("calculator.pid");
    // exec keeps the recorded pid for the calculator itself
    let recorded = ServerConfig::new(
        "calculator",
        "sh",
        vec![
            "-c".to_string(),
            format!(
                "echo $$ > '{}'; exec '{}'",
                pidfile.display(),
                env!("CARGO_BIN_EXE_calculator-server")
            ),
        ],
    );
    let servers = vec![
        recorded,
        ServerConfig::new("ghost", "/nonexistent/ghost-server", vec![]),
    ];

    let err = ToolRegistry::start(&servers, &tool_config()).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::LaunchError);

    let pid = std::fs::read_to_string(&pidfile).unwrap();
    assert!(!std::path::Path::new(&format!("/proc/{}", pid.trim())).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_share_one_process() {
    let registry = ToolRegistry::start(&[calculator()], &tool_config()).await.unwrap();

    let small = ToolCall::new("c1", "multiply_numbers", json!({"x": 2, "y": 3}));
    let medium = ToolCall::new("c2", "multiply_numbers", json!({"x": 20, "y": 30}));
    let large = ToolCall::new("c3", "multiply_numbers", json!({"x": 200, "y": 300}));
    let (small, medium, large) = tokio::join!(
        registry.invoke(&small),
        registry.invoke(&medium),
        registry.invoke(&large)
    );

    assert_eq!(small.unwrap(), ToolResult::success(json!(6.0)));
    assert_eq!(medium.unwrap(), ToolResult::success(json!(600.0)));
    assert_eq!(large.unwrap(), ToolResult::success(json!(60000.0)));

    registry.close().await.unwrap();
}

#[tokio::test]
async fn test_customer_lookup_server() {
    let mut data = NamedTempFile::new().unwrap();
    write!(
        data,
        r#"[{{"customer_id":"C001","nombre":"María García"}},{{"customer_id":"C002","nombre":"Juan Pérez"}}]"#
    )
    .unwrap();

    let server = ServerConfig::new(
        "customer",
        env!("CARGO_BIN_EXE_customer-server"),
        vec![data.path().display().to_string()],
    );
    let registry = ToolRegistry::start(&[server], &tool_config()).await.unwrap();
    assert_eq!(
        registry.tool_names(),
        vec!["get_customer_by_id", "find_customers_by_name", "get_all_customers"]
    );

    let found = registry
        .invoke(&ToolCall::new("c1", "find_customers_by_name", json!({"partial_name": "garcía"})))
        .await
        .unwrap();
    assert_eq!(
        found,
        ToolResult::success(json!([{"customer_id":"C001","nombre":"María García"}]))
    );

    let missing = registry
        .invoke(&ToolCall::new("c2", "get_customer_by_id", json!({"customer_id": "C404"})))
        .await
        .unwrap();
    assert_eq!(
        missing,
        ToolResult::success(json!({"error": "Customer with ID C404 not found."}))
    );

    registry.close().await.unwrap();
}

#[tokio::test]
async fn test_knowledge_base_server_lookup() {
    let mut data = NamedTempFile::new().unwrap();
    write!(
        data,
        r#"{{"datos":{{"signalQualityIssuesDetail":{{"detailSignalPlane":[{{"imsi":"730011234567890","rsrp":-112}}]}}}}}}"#
    )
    .unwrap();

    let server = ServerConfig::new(
        "knowledge_base",
        env!("CARGO_BIN_EXE_knowledge-base-server"),
        vec![data.path().display().to_string()],
    );
    let registry = ToolRegistry::start(&[server], &tool_config()).await.unwrap();
    assert_eq!(registry.tool_names(), vec!["get_customer_by_imsi"]);

    let found = registry
        .invoke(&ToolCall::new("c1", "get_customer_by_imsi", json!({"imsi": "730011234567890"})))
        .await
        .unwrap();
    assert_eq!(
        found,
        ToolResult::success(json!({"imsi": "730011234567890", "rsrp": -112}))
    );

    let missing = registry
        .invoke(&ToolCall::new("c2", "get_customer_by_imsi", json!({"imsi": "1"})))
        .await
        .unwrap();
    assert_eq!(
        missing,
        ToolResult::success(json!({"error": "Customer with IMSI 1 not found."}))
    );

    registry.close().await.unwrap();
}

/// Matches request bodies that do not contain the given text
struct BodyLacks(&'static str);

impl Match for BodyLacks {
    fn matches(&self, request: &Request) -> bool {
        !String::from_utf8_lossy(&request.body).contains(self.0)
    }
}

fn sse(events: &[serde_json::Value]) -> ResponseTemplate {
    let mut body: String = events
        .iter()
        .map(|event| format!("data: {}\n\n", event))
        .collect();
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn text_event(text: &str) -> serde_json::Value {
    json!({"choices": [{"delta": {"content": text}}]})
}

#[tokio::test]
async fn test_http_provider_through_global_entry_point() {
    let server = MockServer::start().await;

    // Router request carries the decision schema
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("routing_decision"))
        .respond_with(sse(&[text_event(
            r#"{"agent":"Calc","question":"What is 3+5?"}"#,
        )]))
        .mount(&server)
        .await;

    // First agent turn: ask for the tool
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(BodyLacks("routing_decision"))
        .and(BodyLacks("tool_call_id"))
        .respond_with(sse(&[json!({"choices": [{"delta": {"tool_calls": [{
            "index": 0,
            "id": "call_1",
            "type": "function",
            "function": {"name": "add_numbers", "arguments": "{\"x\":3,\"y\":5}"}
        }]}}]})]))
        .mount(&server)
        .await;

    // Second agent turn: the tool result is in the history
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(BodyLacks("routing_decision"))
        .and(body_string_contains("tool_call_id"))
        .respond_with(sse(&[text_event("3 + 5 = 8")]))
        .mount(&server)
        .await;

    let config = LLMConfig {
        provider: ProviderKind::OpenAi,
        model: "gpt-4o-mini".to_string(),
        max_tokens: 256,
        temperature: 0.0,
        api_base: server.uri(),
        endpoint: None,
        deployment: None,
        api_version: "2024-10-21".to_string(),
        request_timeout_ms: Some(10_000),
    };
    let provider: Arc<dyn CompletionProvider> =
        Arc::new(OpenAiCompletion::new("test-key".to_string(), config).unwrap());

    let calc = Agent::builder("Calc")
        .description("Arithmetic")
        .instructions("Use the calculator.")
        .server(calculator())
        .tool_config(tool_config())
        .provider(Arc::clone(&provider))
        .build()
        .await
        .unwrap();
    let orchestrator = AgentOrchestrator::new(vec![calc], Router::new(provider)).unwrap();
    mcp_orchestra::init_with(orchestrator).await.unwrap();

    let response = mcp_orchestra::handle(HandleRequest {
        question: "What is 3+5?".to_string(),
        customer_id: Some("C001".to_string()),
    })
    .await
    .unwrap();
    assert_eq!(response.answer, "3 + 5 = 8");

    let report = mcp_orchestra::health().await.unwrap();
    assert!(report.is_healthy());

    mcp_orchestra::shutdown().await.unwrap();
    assert!(!mcp_orchestra::health().await.unwrap().is_healthy());
}
