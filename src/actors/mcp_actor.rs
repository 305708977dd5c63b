use crate::core::mcp::{ChannelStatus, McpConnection};
use crate::error::{AgentError, Result};
use crate::tools::ToolResult;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};

/// One outstanding request per channel; callers queue behind it.
const CHANNEL_BUFFER_SIZE: usize = 32;

#[derive(Debug)]
pub(crate) enum ChannelMessage {
    Call {
        name: String,
        arguments: Value,
        response: oneshot::Sender<Result<ToolResult>>,
    },
    Stop {
        response: oneshot::Sender<Result<()>>,
    },
}

enum ActorEvent {
    Message(Option<ChannelMessage>),
    Exited(std::io::Result<std::process::ExitStatus>),
}

/// Handle to the actor that owns a tool process.
///
/// Dropping the handle closes the mailbox; the actor then drops the
/// connection, which kills the process.
pub(crate) struct ChannelActorHandle {
    server: String,
    sender: Sender<ChannelMessage>,
    stop_requested: AtomicBool,
}

impl ChannelActorHandle {
    pub(crate) fn spawn(
        server: String,
        connection: McpConnection,
        status: Arc<ChannelStatus>,
        call_timeout: Duration,
    ) -> Self {
        let (sender, receiver) = channel(CHANNEL_BUFFER_SIZE);
        tokio::spawn(channel_actor(
            server.clone(),
            receiver,
            connection,
            status,
            call_timeout,
        ));
        Self {
            server,
            sender,
            stop_requested: AtomicBool::new(false),
        }
    }

    pub(crate) async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(ChannelMessage::Call {
                name: name.to_string(),
                arguments,
                response: response_tx,
            })
            .await
            .map_err(|_| self.closed())?;

        response_rx.await.map_err(|_| self.closed())?
    }

    pub(crate) async fn stop(&self) -> Result<bool> {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let (response_tx, response_rx) = oneshot::channel();
        if self
            .sender
            .send(ChannelMessage::Stop {
                response: response_tx,
            })
            .await
            .is_err()
        {
            // Actor already gone together with its process
            return Ok(true);
        }

        match response_rx.await {
            Ok(result) => result.map(|_| true),
            Err(_) => Ok(true),
        }
    }

    fn closed(&self) -> AgentError {
        AgentError::ChannelClosed {
            server: self.server.clone(),
        }
    }
}

async fn channel_actor(
    server: String,
    mut receiver: Receiver<ChannelMessage>,
    mut connection: McpConnection,
    status: Arc<ChannelStatus>,
    call_timeout: Duration,
) {
    tracing::debug!("[{}] Channel actor started", server);
    let mut exited = false;

    loop {
        let event = tokio::select! {
            message = receiver.recv() => ActorEvent::Message(message),
            exit = connection.wait(), if !exited => ActorEvent::Exited(exit),
        };

        match event {
            ActorEvent::Message(Some(ChannelMessage::Call {
                name,
                arguments,
                response,
            })) => {
                let result =
                    handle_call(&server, &mut connection, &status, &name, arguments, call_timeout)
                        .await;
                let _ = response.send(result);
            }
            ActorEvent::Message(Some(ChannelMessage::Stop { response })) => {
                status.mark_dead();
                let result = connection.shutdown().await;
                tracing::info!("[{}] Tool channel stopped", server);
                let _ = response.send(result);
                return;
            }
            ActorEvent::Message(None) => {
                tracing::debug!("[{}] Channel handle dropped, shutting down", server);
                break;
            }
            ActorEvent::Exited(exit) => {
                exited = true;
                if status.mark_dead() {
                    match exit {
                        Ok(code) => tracing::warn!("[{}] Tool process exited ({})", server, code),
                        Err(e) => tracing::warn!("[{}] Tool process lost: {}", server, e),
                    }
                }
            }
        }
    }

    status.mark_dead();
    if let Err(e) = connection.shutdown().await {
        tracing::warn!("[{}] {}", server, e);
    }
}

async fn handle_call(
    server: &str,
    connection: &mut McpConnection,
    status: &ChannelStatus,
    name: &str,
    arguments: Value,
    call_timeout: Duration,
) -> Result<ToolResult> {
    if !status.is_alive() {
        return Err(AgentError::ChannelClosed {
            server: server.to_string(),
        });
    }

    tracing::debug!("[{}] Calling tool: {}", server, name);

    match timeout(call_timeout, connection.call_tool(name, arguments)).await {
        Ok(Ok(result)) => {
            if let ToolResult::Failure { error } = &result {
                tracing::warn!("[{}] Tool '{}' reported a fault: {}", server, name, error);
            }
            Ok(result)
        }
        Ok(Err(e)) => {
            if matches!(
                e,
                AgentError::ProtocolViolation { .. } | AgentError::ChannelClosed { .. }
            ) {
                status.mark_dead();
                tracing::error!("[{}] Channel failed: {}", server, e);
            }
            Err(e)
        }
        Err(_) => {
            tracing::warn!("[{}] Tool '{}' timed out after {:?}", server, name, call_timeout);
            Ok(ToolResult::failure(format!(
                "Tool '{}' timed out after {:?}",
                name, call_timeout
            )))
        }
    }
}
