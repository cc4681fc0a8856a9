//! Client and operation identification.

use crate::middleware::RequestContext;

use super::operation::Operation;

/// Client id used when nothing else identifies the caller.
pub const DEFAULT_CLIENT_ID: &str = "default";

/// Namespace prefix shared by all Firecrawl tool names.
const TOOL_PREFIX: &str = "firecrawl_";

/// Keyword rules in priority order. The first rule with a matching keyword wins.
const OPERATION_RULES: &[(Operation, &[&str])] = &[
    (Operation::Batch, &["batch"]),
    (Operation::Scrape, &["scrape"]),
    (Operation::Crawl, &["crawl"]),
    (Operation::Search, &["search"]),
    (Operation::Extract, &["extract"]),
    (Operation::Map, &["map"]),
    (Operation::VectorSearch, &["vector", "rag"]),
];

/// Strategy for partitioning rate-limit state.
pub trait RequestIdentifier: Send + Sync {
    /// The key that identifies the caller.
    fn resolve_client_id(&self, ctx: &RequestContext) -> String;

    /// The category of work the request represents.
    fn resolve_operation(&self, ctx: &RequestContext) -> Operation;
}

/// Identification from session state, transport metadata and tool names.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIdentifier;

impl RequestIdentifier for DefaultIdentifier {
    fn resolve_client_id(&self, ctx: &RequestContext) -> String {
        if let Some(id) = ctx.session_client_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        if let Some(addr) = &ctx.transport.remote_addr {
            return format!("ip:{}", addr);
        }
        if let Some(conn) = &ctx.transport.connection_id {
            return format!("conn:{}", conn);
        }
        if !ctx.source.is_empty() {
            return format!("source:{}", ctx.source);
        }
        DEFAULT_CLIENT_ID.to_string()
    }

    fn resolve_operation(&self, ctx: &RequestContext) -> Operation {
        classify_operation(ctx.target())
    }
}

/// Classify a tool or method name into an operation category.
pub fn classify_operation(name: &str) -> Operation {
    let lowered = name.to_lowercase();
    let name = lowered.strip_prefix(TOOL_PREFIX).unwrap_or(&lowered);

    OPERATION_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| name.contains(*kw)))
        .map(|(op, _)| *op)
        .unwrap_or(Operation::General)
}
