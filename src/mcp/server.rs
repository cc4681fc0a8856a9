//! Line-delimited JSON-RPC server over stdio.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, JSONRPC_VERSION, PARSE_ERROR,
};
use super::tools;
use crate::error::{FiregateError, Result};
use crate::middleware::{Pipeline, RequestContext, TransportInfo};

/// Label recorded as the source of every request read from stdio.
pub const STDIO_SOURCE: &str = "stdio";

/// Responses waiting to be written.
const OUTBOUND_BUFFER: usize = 64;

/// State shared by all requests on one connection.
#[derive(Debug)]
struct Session {
    connection_id: String,
    /// Client name announced in `initialize`
    client_id: RwLock<Option<String>>,
}

/// MCP server running requests through a middleware pipeline.
#[derive(Clone)]
pub struct McpServer {
    pipeline: Arc<Pipeline>,
    session: Arc<Session>,
}

impl McpServer {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            session: Arc::new(Session {
                connection_id: Uuid::new_v4().to_string(),
                client_id: RwLock::new(None),
            }),
        }
    }

    /// Client id learned from `initialize`, if any.
    pub fn session_client_id(&self) -> Option<String> {
        self.session.client_id.read().clone()
    }

    /// Serve stdin/stdout until stdin closes.
    pub async fn serve(self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve_io(stdin, tokio::io::stdout()).await
    }

    /// Serve stdin/stdout until stdin closes or the signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.serve() => result,
            _ = signal => {
                info!("Shutdown signal received, stopping MCP server");
                Ok(())
            }
        }
    }

    /// Serve one connection.
    ///
    /// Every message runs in its own task; responses are written in completion
    /// order by a single writer task.
    pub async fn serve_io<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!(
            connection_id = %self.session.connection_id,
            stages = ?self.pipeline.stage_names(),
            "Starting MCP server"
        );

        let (tx, rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            // Session effects apply in arrival order, before later messages run.
            let parsed = self.accept(&line);
            let server = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.respond(parsed).await {
                    if tx.send(response).await.is_err() {
                        warn!("Response dropped, writer has stopped");
                    }
                }
            });
        }

        debug!("Input closed, draining responses");
        drop(tx);

        match writer_task.await {
            Ok(result) => result.map_err(FiregateError::from),
            Err(e) => Err(FiregateError::Internal(format!("writer task failed: {}", e))),
        }
    }

    /// Process one raw message. Returns the encoded response, or `None` for
    /// notifications.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let parsed = self.accept(line);
        self.respond(parsed).await
    }

    /// Parse a raw message and record what `initialize` announces about the client.
    fn accept(&self, line: &str) -> serde_json::Result<Value> {
        let message = serde_json::from_str::<Value>(line)?;
        if message.get("method").and_then(Value::as_str) == Some("initialize") {
            self.remember_client(message.get("params"));
        }
        Ok(message)
    }

    async fn respond(&self, parsed: serde_json::Result<Value>) -> Option<String> {
        let response = match parsed {
            Ok(message) => self.handle_message(message).await?,
            Err(e) => {
                debug!(error = %e, "Unparseable message");
                JsonRpcResponse::protocol_error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e))
            }
        };

        match serde_json::to_string(&response) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                error!(error = %e, "Failed to encode response");
                None
            }
        }
    }

    async fn handle_message(&self, message: Value) -> Option<JsonRpcResponse> {
        let id = message.get("id").cloned().unwrap_or(Value::Null);

        let request = match serde_json::from_value::<JsonRpcRequest>(message) {
            Ok(request) if request.jsonrpc == JSONRPC_VERSION => request,
            Ok(_) => {
                return Some(JsonRpcResponse::protocol_error(
                    id,
                    INVALID_REQUEST,
                    "Invalid request: jsonrpc must be \"2.0\"",
                ))
            }
            Err(e) => {
                return Some(JsonRpcResponse::protocol_error(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ))
            }
        };

        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        let is_tool_call = request.method == "tools/call";

        let ctx = self.context_for(request);
        let response = match self.pipeline.handle(ctx).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            // Firecrawl failures are tool results, not protocol errors.
            Err(err @ FiregateError::Upstream { .. }) if is_tool_call => {
                JsonRpcResponse::success(id, tools::tool_error(&err.to_string()))
            }
            Err(err) => JsonRpcResponse::failure(id, JsonRpcError::from(&err)),
        };
        Some(response)
    }

    fn remember_client(&self, params: Option<&Value>) {
        let name = params
            .and_then(|p| p.pointer("/clientInfo/name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty());

        if let Some(name) = name {
            info!(client_id = %name, "Client initialized");
            *self.session.client_id.write() = Some(name.to_string());
        }
    }

    fn context_for(&self, request: JsonRpcRequest) -> RequestContext {
        let params = request.params.unwrap_or(Value::Null);

        let mut ctx = if request.method == "tools/call" {
            let name = params.get("name").and_then(Value::as_str).map(str::to_string);
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            let mut ctx = RequestContext::new(request.method, arguments);
            ctx.tool_name = name;
            ctx
        } else {
            RequestContext::new(request.method, params)
        };

        ctx = ctx.with_source(STDIO_SOURCE).with_transport(TransportInfo {
            remote_addr: None,
            connection_id: Some(self.session.connection_id.clone()),
        });

        match self.session_client_id() {
            Some(client_id) => ctx.with_session_client_id(client_id),
            None => ctx,
        }
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
