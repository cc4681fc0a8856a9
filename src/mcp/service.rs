//! MCP method dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::firecrawl::FirecrawlApi;
use super::protocol::PROTOCOL_VERSION;
use super::tools::{self, Tool};
use crate::error::{FiregateError, Result};
use crate::middleware::{ErrorHandlingMiddleware, Handler, RequestContext, TimingMiddleware};
use crate::ratelimit::RateLimitBackend;

/// URI of the rate limit status resource.
pub const STATUS_RESOURCE_URI: &str = "firegate://rate-limits";

/// URI of the request statistics resource.
pub const STATS_RESOURCE_URI: &str = "firegate://stats";

/// Handles to the middleware stages that keep request statistics.
#[derive(Clone)]
pub struct PipelineStats {
    pub timing: Arc<TimingMiddleware>,
    pub errors: Arc<ErrorHandlingMiddleware>,
}

impl PipelineStats {
    /// `timing.<operation>.{count,average_ms,min_ms,max_ms}` and `errors.<kind>`.
    pub fn to_json(&self) -> Value {
        let timing: BTreeMap<String, Value> = self
            .timing
            .snapshot()
            .into_iter()
            .map(|(operation, t)| {
                (
                    operation.to_string(),
                    json!({
                        "count": t.count,
                        "average_ms": t.average().as_secs_f64() * 1000.0,
                        "min_ms": t.min.as_secs_f64() * 1000.0,
                        "max_ms": t.max.as_secs_f64() * 1000.0,
                    }),
                )
            })
            .collect();
        let errors: BTreeMap<&str, u64> = self.errors.error_counts().into_iter().collect();

        json!({ "timing": timing, "errors": errors })
    }
}

/// Endpoint at the end of the middleware chain.
pub struct McpService {
    api: Arc<dyn FirecrawlApi>,
    limiter: Arc<dyn RateLimitBackend>,
    stats: Option<PipelineStats>,
}

impl McpService {
    pub fn new(api: Arc<dyn FirecrawlApi>, limiter: Arc<dyn RateLimitBackend>) -> Self {
        Self {
            api,
            limiter,
            stats: None,
        }
    }

    /// Serve the statistics resource from these stages.
    pub fn with_stats(mut self, stats: PipelineStats) -> Self {
        self.stats = Some(stats);
        self
    }

    fn resources(&self) -> Value {
        let mut resources = vec![json!({
            "uri": STATUS_RESOURCE_URI,
            "name": "Rate limit status",
            "description": "Remaining quota for the global and per-client limits",
            "mimeType": "application/json",
        })];
        if self.stats.is_some() {
            resources.push(json!({
                "uri": STATS_RESOURCE_URI,
                "name": "Request statistics",
                "description": "Request timings per operation and error counts per kind",
                "mimeType": "application/json",
            }));
        }
        json!({ "resources": resources })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    async fn call_tool(&self, ctx: RequestContext) -> Result<Value> {
        let name = ctx
            .tool_name
            .as_deref()
            .ok_or_else(|| FiregateError::InvalidParams("tools/call requires a tool name".to_string()))?;
        let tool = Tool::from_name(name).ok_or_else(|| FiregateError::UnknownTool(name.to_string()))?;

        let body = tool.invoke(self.api.as_ref(), ctx.params).await?;
        Ok(tools::tool_result(&body))
    }

    fn read_resource(&self, params: &Value) -> Result<Value> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| FiregateError::InvalidParams("resources/read requires 'uri'".to_string()))?;

        let status = match &self.stats {
            Some(stats) if uri == STATS_RESOURCE_URI => stats.to_json(),
            _ => {
                let client_id = parse_status_uri(uri)?;
                self.limiter.status(client_id.as_deref())
            }
        };

        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "application/json",
                "text": serde_json::to_string_pretty(&status)?,
            }],
        }))
    }

    fn reset(&self, params: &Value) -> Result<Value> {
        let client_id = params
            .get("client_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                FiregateError::InvalidParams("ratelimit/reset requires 'client_id'".to_string())
            })?;

        self.limiter.reset_client(client_id);
        info!(client_id = %client_id, "Rate limits reset by request");
        Ok(json!({}))
    }
}

/// Accepts `firegate://rate-limits` and `firegate://rate-limits?client=<id>`.
fn parse_status_uri(uri: &str) -> Result<Option<String>> {
    let rest = uri
        .strip_prefix(STATUS_RESOURCE_URI)
        .ok_or_else(|| FiregateError::InvalidParams(format!("unknown resource: {}", uri)))?;

    if rest.is_empty() {
        return Ok(None);
    }

    let query = rest
        .strip_prefix('?')
        .ok_or_else(|| FiregateError::InvalidParams(format!("unknown resource: {}", uri)))?;

    Ok(query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == "client" && !value.is_empty())
        .map(|(_, value)| value.to_string()))
}

#[async_trait]
impl Handler for McpService {
    #[instrument(
        skip(self, ctx),
        fields(
            request_id = %ctx.request_id,
            method = %ctx.method,
            tool = ctx.tool_name.as_deref().unwrap_or("")
        )
    )]
    async fn call(&self, ctx: RequestContext) -> Result<Value> {
        debug!("Dispatching request");

        match ctx.method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tools::definitions() })),
            "tools/call" => self.call_tool(ctx).await,
            "resources/list" => Ok(self.resources()),
            "resources/read" => self.read_resource(&ctx.params),
            "ratelimit/reset" => self.reset(&ctx.params),
            other => Err(FiregateError::MethodNotFound(other.to_string())),
        }
    }
}
