//! Per-request context passed through the middleware chain.

use serde_json::Value;
use uuid::Uuid;

/// Metadata describing the connection a request arrived on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportInfo {
    /// Remote network address, if the transport has one
    pub remote_addr: Option<String>,
    /// Identifier of the connection or stdio session
    pub connection_id: Option<String>,
}

/// A single inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id for correlating log lines
    pub request_id: String,
    /// JSON-RPC method name
    pub method: String,
    /// Tool name for `tools/call` requests
    pub tool_name: Option<String>,
    /// Method params, or tool arguments for `tools/call`
    pub params: Value,
    /// Label describing where the request came from
    pub source: String,
    /// Transport metadata
    pub transport: TransportInfo,
    /// Client id stored in the session, e.g. learned during `initialize`
    pub session_client_id: Option<String>,
}

impl RequestContext {
    /// Create a context with a fresh request id and no transport metadata.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method: method.into(),
            tool_name: None,
            params,
            source: String::new(),
            transport: TransportInfo::default(),
            session_client_id: None,
        }
    }

    /// Create a `tools/call` context for a named tool.
    pub fn tool_call(tool: impl Into<String>, arguments: Value) -> Self {
        let mut ctx = Self::new("tools/call", arguments);
        ctx.tool_name = Some(tool.into());
        ctx
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_transport(mut self, transport: TransportInfo) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_session_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.session_client_id = Some(client_id.into());
        self
    }

    /// The tool name if present, otherwise the method.
    pub fn target(&self) -> &str {
        self.tool_name.as_deref().unwrap_or(&self.method)
    }
}
