//! Tool channels - one child tool process spoken to over stdio
//!
//! A [`ToolChannel`] launches its process, performs the signature handshake and
//! then hands the connection to a channel actor that serialises calls. The
//! process is killed when the channel is stopped or dropped.

use crate::actors::mcp_actor::ChannelActorHandle;
use crate::config::ServerConfig;
use crate::core::protocol::{
    parse_frame, CallToolParams, CallToolResult, Frame, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST, PROTOCOL_VERSION,
};
use crate::error::{AgentError, Result};
use crate::tools::{ToolConfig, ToolResult, ToolSignature};
use serde::Serialize;
use serde_json::{json, Value};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

/// Liveness of a channel. Moves `Pending -> Alive -> Dead` or `Pending -> Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Pending,
    Alive,
    Dead,
}

const PENDING: u8 = 0;
const ALIVE: u8 = 1;
const DEAD: u8 = 2;

/// Shared liveness flag between a channel and its actor
#[derive(Debug)]
pub(crate) struct ChannelStatus(AtomicU8);

impl ChannelStatus {
    fn new() -> Self {
        Self(AtomicU8::new(PENDING))
    }

    pub(crate) fn state(&self) -> ChannelState {
        match self.0.load(Ordering::Acquire) {
            PENDING => ChannelState::Pending,
            ALIVE => ChannelState::Alive,
            _ => ChannelState::Dead,
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.state() == ChannelState::Alive
    }

    fn mark_alive(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ALIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true only for the transition that actually killed the channel
    pub(crate) fn mark_dead(&self) -> bool {
        self.0.swap(DEAD, Ordering::AcqRel) != DEAD
    }
}

/// Stdio connection to a tool process
pub(crate) struct McpConnection {
    server: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    // Partial line survives a cancelled read
    line: Vec<u8>,
    next_id: u64,
}

impl McpConnection {
    pub(crate) async fn spawn(config: &ServerConfig) -> Result<Self> {
        let launch_error = |message: String| AgentError::Launch {
            server: config.name.clone(),
            message,
        };

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_error(format!("{} {}: {}", config.command, config.args.join(" "), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error("failed to open stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error("failed to open stdout".to_string()))?;

        tracing::debug!(
            "[{}] Spawned tool process (pid {:?})",
            config.name,
            child.id()
        );

        Ok(Self {
            server: config.name.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            line: Vec::new(),
            next_id: 0,
        })
    }

    /// Initialize the session and fetch the advertised signatures
    pub(crate) async fn handshake(&mut self) -> Result<Vec<ToolSignature>> {
        let init = self
            .request(
                METHOD_INITIALIZE,
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await?;
        if let Some(error) = init.error {
            return Err(self.handshake_error(format!("initialize rejected: {}", error.message)));
        }

        self.notify(METHOD_INITIALIZED, None).await?;

        let listed = self.request(METHOD_TOOLS_LIST, None).await?;
        let result = match (listed.result, listed.error) {
            (_, Some(error)) => {
                return Err(self.handshake_error(format!("tools/list rejected: {}", error.message)))
            }
            (Some(result), None) => result,
            (None, None) => return Err(self.handshake_error("tools/list returned nothing".to_string())),
        };

        let tools: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| self.handshake_error(format!("invalid signature set: {}", e)))?;

        Ok(tools.tools.into_iter().map(ToolSignature::from).collect())
    }

    pub(crate) async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolResult> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| self.violation(format!("unserialisable arguments: {}", e)))?;

        let response = self.request(METHOD_TOOLS_CALL, Some(params)).await?;

        if let Some(error) = response.error {
            return Ok(ToolResult::failure(error.message));
        }

        let result = response
            .result
            .ok_or_else(|| self.violation("tools/call response without result".to_string()))?;
        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|e| self.violation(format!("malformed tools/call result: {}", e)))?;

        Ok(result.into())
    }

    /// Send a request and read until the response carrying its id
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let id = self.next_id();
        self.send(&JsonRpcRequest::new(id, method, params)).await?;

        loop {
            let line = self.read_line().await?;
            if line.trim().is_empty() {
                continue;
            }

            match parse_frame(&line).map_err(|e| self.violation(e))? {
                Frame::Response(response) if response.id == Some(id) => return Ok(response),
                Frame::Response(response) => {
                    tracing::debug!(
                        "[{}] Skipping response for stale request {:?}",
                        self.server,
                        response.id
                    );
                }
                Frame::Notification(notification) => {
                    tracing::debug!("[{}] Notification: {}", self.server, notification.method);
                }
                Frame::Request(request) => {
                    tracing::debug!(
                        "[{}] Ignoring server request: {}",
                        self.server,
                        request.method
                    );
                }
            }
        }
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        self.send(&JsonRpcRequest::notification(method, params)).await
    }

    async fn send(&mut self, request: &JsonRpcRequest) -> Result<()> {
        let mut json = serde_json::to_string(request)
            .map_err(|e| self.violation(format!("unserialisable request: {}", e)))?;
        json.push('\n');

        tracing::trace!("[{}] -> {}", self.server, json.trim_end());

        if let Err(e) = self.write_line(json.as_bytes()).await {
            tracing::warn!("[{}] Write to tool process failed: {}", self.server, e);
            return Err(self.closed());
        }
        Ok(())
    }

    async fn write_line(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(bytes).await?;
        self.stdin.flush().await
    }

    async fn read_line(&mut self) -> Result<String> {
        let read = self.stdout.read_until(b'\n', &mut self.line).await;
        match read {
            Ok(0) => Err(self.closed()),
            Ok(_) if !self.line.ends_with(b"\n") => Err(self.closed()),
            Ok(_) => {
                let bytes = std::mem::take(&mut self.line);
                let line = String::from_utf8(bytes)
                    .map_err(|_| self.violation("non UTF-8 output".to_string()))?;
                tracing::trace!("[{}] <- {}", self.server, line.trim_end());
                Ok(line)
            }
            Err(e) => {
                tracing::warn!("[{}] Read from tool process failed: {}", self.server, e);
                Err(self.closed())
            }
        }
    }

    /// Exit status if the process terminates within a short grace period
    async fn exited(&mut self) -> Option<ExitStatus> {
        match timeout(Duration::from_millis(200), self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => None,
        }
    }

    /// Resolves when the process exits. Cancel safe.
    pub(crate) async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    pub(crate) async fn shutdown(mut self) -> Result<()> {
        drop(self.stdin);
        if self.child.try_wait().ok().flatten().is_some() {
            return Ok(());
        }

        self.child.start_kill().map_err(|e| AgentError::Shutdown {
            server: self.server.clone(),
            message: e.to_string(),
        })?;

        if timeout(Duration::from_secs(2), self.child.wait()).await.is_err() {
            tracing::warn!("[{}] Tool process did not exit after kill", self.server);
        }
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn violation(&self, message: String) -> AgentError {
        AgentError::ProtocolViolation {
            server: self.server.clone(),
            message,
        }
    }

    fn closed(&self) -> AgentError {
        AgentError::ChannelClosed {
            server: self.server.clone(),
        }
    }

    fn handshake_error(&self, message: String) -> AgentError {
        AgentError::Handshake {
            server: self.server.clone(),
            message,
        }
    }
}

/// One child tool process plus its advertised signatures
pub struct ToolChannel {
    config: ServerConfig,
    tool_config: ToolConfig,
    status: Arc<ChannelStatus>,
    signatures: Vec<ToolSignature>,
    actor: Option<ChannelActorHandle>,
}

impl ToolChannel {
    pub fn new(config: ServerConfig, tool_config: ToolConfig) -> Self {
        Self {
            config,
            tool_config,
            status: Arc::new(ChannelStatus::new()),
            signatures: Vec::new(),
            actor: None,
        }
    }

    /// Launch the process and discover its signatures.
    ///
    /// On failure the process is already gone and the channel is dead.
    pub async fn start(&mut self) -> Result<()> {
        if self.status.state() != ChannelState::Pending {
            return Err(AgentError::ChannelClosed {
                server: self.config.name.clone(),
            });
        }

        let mut connection = match McpConnection::spawn(&self.config).await {
            Ok(connection) => connection,
            Err(e) => {
                self.status.mark_dead();
                return Err(e);
            }
        };

        let handshake = timeout(self.tool_config.handshake_timeout, connection.handshake()).await;
        let signatures = match handshake {
            Ok(Ok(signatures)) => signatures,
            Ok(Err(e)) => {
                let err = self.classify_startup_failure(&mut connection, e).await;
                self.abort_start(connection).await;
                return Err(err);
            }
            Err(_) => {
                self.abort_start(connection).await;
                return Err(AgentError::Handshake {
                    server: self.config.name.clone(),
                    message: format!(
                        "no signature set within {:?}",
                        self.tool_config.handshake_timeout
                    ),
                });
            }
        };

        tracing::info!(
            "[{}] Tool channel started with {} tools: {}",
            self.config.name,
            signatures.len(),
            signatures
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.signatures = signatures;
        self.status.mark_alive();
        self.actor = Some(ChannelActorHandle::spawn(
            self.config.name.clone(),
            connection,
            Arc::clone(&self.status),
            self.tool_config.call_timeout,
        ));
        Ok(())
    }

    async fn classify_startup_failure(
        &self,
        connection: &mut McpConnection,
        err: AgentError,
    ) -> AgentError {
        match err {
            AgentError::ChannelClosed { .. } => match connection.exited().await {
                Some(status) => AgentError::Launch {
                    server: self.config.name.clone(),
                    message: format!("process exited during startup ({})", status),
                },
                None => AgentError::Handshake {
                    server: self.config.name.clone(),
                    message: "stream closed during handshake".to_string(),
                },
            },
            AgentError::ProtocolViolation { message, .. } => AgentError::Handshake {
                server: self.config.name.clone(),
                message,
            },
            other => other,
        }
    }

    async fn abort_start(&self, connection: McpConnection) {
        self.status.mark_dead();
        if let Err(e) = connection.shutdown().await {
            tracing::warn!("[{}] Cleanup after failed start: {}", self.config.name, e);
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn signatures(&self) -> &[ToolSignature] {
        &self.signatures
    }

    pub fn advertises(&self, tool: &str) -> bool {
        self.signatures.iter().any(|s| s.name == tool)
    }

    pub fn state(&self) -> ChannelState {
        self.status.state()
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    /// Invoke an advertised tool. Application faults come back as
    /// `ToolResult::Failure`; only channel-level problems are errors.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let actor = match &self.actor {
            Some(actor) if self.status.is_alive() => actor,
            _ => {
                return Err(AgentError::ChannelClosed {
                    server: self.config.name.clone(),
                })
            }
        };

        if !self.advertises(name) {
            return Err(AgentError::UnknownTool(name.to_string()));
        }

        actor.call(name, arguments).await
    }

    /// Terminate the process if still running. Idempotent; returns whether
    /// this call was the one that stopped the process.
    pub async fn stop(&self) -> Result<bool> {
        match &self.actor {
            Some(actor) => actor.stop().await,
            None => {
                self.status.mark_dead();
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for ToolChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolChannel")
            .field("server", &self.config.name)
            .field("state", &self.state())
            .field("tools", &self.signatures.iter().map(|s| &s.name).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_server(name: &str, script: &str) -> ServerConfig {
        ServerConfig::new(name, "sh", vec!["-c".to_string(), script.to_string()])
    }

    fn quick_config() -> ToolConfig {
        ToolConfig {
            handshake_timeout: Duration::from_secs(2),
            call_timeout: Duration::from_secs(2),
        }
    }

    const HANDSHAKE: &str = r#"read l; echo '{"jsonrpc":"2.0","id":1,"result":{}}'; read l; read l; echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo","inputSchema":{"type":"object","properties":{"text":{"type":"string"}},"required":["text"]}}]}}'"#;

    #[test]
    fn test_status_transitions_once() {
        let status = ChannelStatus::new();
        assert_eq!(status.state(), ChannelState::Pending);
        assert!(status.mark_alive());
        assert!(!status.mark_alive());
        assert!(status.mark_dead());
        assert!(!status.mark_dead());
        assert!(!status.mark_alive());
        assert_eq!(status.state(), ChannelState::Dead);
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let mut channel = ToolChannel::new(
            ServerConfig::new("ghost", "/nonexistent/tool-server", vec![]),
            quick_config(),
        );

        let err = channel.start().await.unwrap_err();
        assert!(matches!(err, AgentError::Launch { .. }));
        assert_eq!(channel.state(), ChannelState::Dead);
    }

    #[tokio::test]
    async fn test_process_exiting_at_startup_is_launch_error() {
        let mut channel = ToolChannel::new(script_server("quitter", "exit 2"), quick_config());

        let err = channel.start().await.unwrap_err();
        assert!(matches!(err, AgentError::Launch { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_malformed_handshake_never_alive() {
        let mut channel = ToolChannel::new(
            script_server("noisy", "read l; echo 'Starting server...'; sleep 5"),
            quick_config(),
        );

        let err = channel.start().await.unwrap_err();
        assert!(matches!(err, AgentError::Handshake { .. }), "got {:?}", err);
        assert_ne!(channel.state(), ChannelState::Alive);

        let err = channel.call("echo", json!({"text": "hi"})).await.unwrap_err();
        assert!(matches!(err, AgentError::ChannelClosed { .. }));
    }

    #[tokio::test]
    async fn test_invalid_signature_set_is_handshake_error() {
        let script = r#"read l; echo '{"jsonrpc":"2.0","id":1,"result":{}}'; read l; read l; echo '{"jsonrpc":"2.0","id":2,"result":{"tools":"none"}}'; sleep 5"#;
        let mut channel = ToolChannel::new(script_server("bad-list", script), quick_config());

        let err = channel.start().await.unwrap_err();
        assert!(matches!(err, AgentError::Handshake { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_silent_server_times_out_handshake() {
        let config = ToolConfig {
            handshake_timeout: Duration::from_millis(200),
            call_timeout: Duration::from_secs(1),
        };
        let mut channel = ToolChannel::new(script_server("silent", "sleep 5"), config);

        let err = channel.start().await.unwrap_err();
        assert!(matches!(err, AgentError::Handshake { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_call_matches_own_request_id() {
        // Emits a stale response and a notification before the real one
        let script = format!(
            r#"{}; read l; echo '{{"jsonrpc":"2.0","id":99,"result":{{"content":[{{"type":"text","text":"stale"}}]}}}}'; echo '{{"jsonrpc":"2.0","method":"notifications/message","params":{{}}}}'; echo '{{"jsonrpc":"2.0","id":3,"result":{{"content":[{{"type":"text","text":"fresh"}}]}}}}'; sleep 5"#,
            HANDSHAKE
        );
        let mut channel = ToolChannel::new(script_server("echo", &script), quick_config());
        channel.start().await.unwrap();
        assert!(channel.is_alive());
        assert_eq!(channel.signatures()[0].name, "echo");

        let result = channel.call("echo", json!({"text": "x"})).await.unwrap();
        assert_eq!(result, ToolResult::success("fresh"));

        assert!(channel.stop().await.unwrap());
    }

    #[tokio::test]
    async fn test_extraneous_stdout_is_protocol_violation() {
        let script = format!(r#"{}; read l; echo 'debug: computing'; sleep 5"#, HANDSHAKE);
        let mut channel = ToolChannel::new(script_server("chatty", &script), quick_config());
        channel.start().await.unwrap();

        let err = channel.call("echo", json!({"text": "x"})).await.unwrap_err();
        assert!(matches!(err, AgentError::ProtocolViolation { .. }), "got {:?}", err);
        assert_eq!(channel.state(), ChannelState::Dead);

        let err = channel.call("echo", json!({"text": "x"})).await.unwrap_err();
        assert!(matches!(err, AgentError::ChannelClosed { .. }));
    }

    #[tokio::test]
    async fn test_exited_process_closes_channel() {
        let script = format!("{}; exit 0", HANDSHAKE);
        let mut channel = ToolChannel::new(script_server("short-lived", &script), quick_config());
        channel.start().await.unwrap();

        let err = channel.call("echo", json!({"text": "x"})).await.unwrap_err();
        assert!(matches!(err, AgentError::ChannelClosed { .. }), "got {:?}", err);
        assert!(!channel.is_alive());
    }

    #[tokio::test]
    async fn test_unadvertised_tool_is_rejected_locally() {
        let script = format!("{}; sleep 5", HANDSHAKE);
        let mut channel = ToolChannel::new(script_server("echo", &script), quick_config());
        channel.start().await.unwrap();

        let err = channel.call("shout", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(ref name) if name == "shout"));
        assert!(channel.is_alive());

        assert!(channel.stop().await.unwrap());
        assert!(!channel.stop().await.unwrap());
        assert_eq!(channel.state(), ChannelState::Dead);
    }
}
