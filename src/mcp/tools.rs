//! Firecrawl tool definitions and dispatch.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::firecrawl::FirecrawlApi;
use crate::error::{FiregateError, Result};

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// The Firecrawl tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Scrape,
    BatchScrape,
    Crawl,
    CheckCrawlStatus,
    Map,
    Search,
    Extract,
}

/// Required argument and its expected shape.
enum Required {
    String(&'static str),
    StringList(&'static str),
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::Scrape,
        Tool::BatchScrape,
        Tool::Crawl,
        Tool::CheckCrawlStatus,
        Tool::Map,
        Tool::Search,
        Tool::Extract,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Scrape => "firecrawl_scrape",
            Tool::BatchScrape => "firecrawl_batch_scrape",
            Tool::Crawl => "firecrawl_crawl",
            Tool::CheckCrawlStatus => "firecrawl_check_crawl_status",
            Tool::Map => "firecrawl_map",
            Tool::Search => "firecrawl_search",
            Tool::Extract => "firecrawl_extract",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            Tool::Scrape => "Scrape a single URL and return its content in the requested formats.",
            Tool::BatchScrape => "Scrape several URLs in one asynchronous batch job.",
            Tool::Crawl => "Start a crawl of a website, following links from the given URL.",
            Tool::CheckCrawlStatus => "Check the progress and results of a crawl job.",
            Tool::Map => "Discover the URLs of a website without scraping their content.",
            Tool::Search => "Search the web and optionally scrape the results.",
            Tool::Extract => "Extract structured data from one or more URLs using a prompt or schema.",
        }
    }

    fn required(&self) -> Required {
        match self {
            Tool::Scrape | Tool::Crawl | Tool::Map => Required::String("url"),
            Tool::CheckCrawlStatus => Required::String("id"),
            Tool::Search => Required::String("query"),
            Tool::BatchScrape | Tool::Extract => Required::StringList("urls"),
        }
    }

    fn properties(&self) -> Value {
        match self {
            Tool::Scrape => json!({
                "url": { "type": "string", "description": "URL to scrape" },
                "formats": {
                    "type": "array",
                    "items": { "type": "string", "enum": ["markdown", "html", "rawHtml", "links", "screenshot"] },
                    "default": ["markdown"]
                },
                "onlyMainContent": { "type": "boolean" },
                "waitFor": { "type": "integer", "description": "Milliseconds to wait before scraping" },
                "timeout": { "type": "integer" }
            }),
            Tool::BatchScrape => json!({
                "urls": { "type": "array", "items": { "type": "string" } },
                "options": { "type": "object" }
            }),
            Tool::Crawl => json!({
                "url": { "type": "string", "description": "Starting URL" },
                "limit": { "type": "integer", "description": "Maximum pages to crawl" },
                "maxDepth": { "type": "integer" },
                "includePaths": { "type": "array", "items": { "type": "string" } },
                "excludePaths": { "type": "array", "items": { "type": "string" } },
                "scrapeOptions": { "type": "object" }
            }),
            Tool::CheckCrawlStatus => json!({
                "id": { "type": "string", "description": "Crawl job id" }
            }),
            Tool::Map => json!({
                "url": { "type": "string" },
                "search": { "type": "string", "description": "Only return URLs matching this term" },
                "includeSubdomains": { "type": "boolean" },
                "limit": { "type": "integer" }
            }),
            Tool::Search => json!({
                "query": { "type": "string" },
                "limit": { "type": "integer", "default": 5 },
                "lang": { "type": "string" },
                "country": { "type": "string" },
                "scrapeOptions": { "type": "object" }
            }),
            Tool::Extract => json!({
                "urls": { "type": "array", "items": { "type": "string" } },
                "prompt": { "type": "string" },
                "schema": { "type": "object" },
                "enableWebSearch": { "type": "boolean" }
            }),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let required = match self.required() {
            Required::String(name) | Required::StringList(name) => name,
        };
        ToolDefinition {
            name: self.name(),
            description: self.description(),
            input_schema: json!({
                "type": "object",
                "properties": self.properties(),
                "required": [required],
            }),
        }
    }

    /// Check the required argument is present and well-formed.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<()> {
        match self.required() {
            Required::String(name) => match args.get(name).and_then(Value::as_str) {
                Some(s) if !s.trim().is_empty() => Ok(()),
                _ => Err(FiregateError::InvalidParams(format!(
                    "{} requires a non-empty string '{}'",
                    self.name(),
                    name
                ))),
            },
            Required::StringList(name) => match args.get(name).and_then(Value::as_array) {
                Some(items) if !items.is_empty() && items.iter().all(Value::is_string) => Ok(()),
                _ => Err(FiregateError::InvalidParams(format!(
                    "{} requires a non-empty list of strings '{}'",
                    self.name(),
                    name
                ))),
            },
        }
    }

    /// Validate the arguments and forward them to the Firecrawl API.
    pub async fn invoke(&self, api: &dyn FirecrawlApi, arguments: Value) -> Result<Value> {
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(FiregateError::InvalidParams(
                    "tool arguments must be an object".to_string(),
                ))
            }
        };
        self.validate(&args)?;
        debug!(tool = self.name(), "Invoking Firecrawl");

        match self {
            Tool::CheckCrawlStatus => {
                let id = args.get("id").and_then(Value::as_str).unwrap_or_default();
                api.get(&format!("/v1/crawl/{}", id)).await
            }
            _ => api.post(self.endpoint(), Value::Object(args)).await,
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            Tool::Scrape => "/v1/scrape",
            Tool::BatchScrape => "/v1/batch/scrape",
            Tool::Crawl | Tool::CheckCrawlStatus => "/v1/crawl",
            Tool::Map => "/v1/map",
            Tool::Search => "/v1/search",
            Tool::Extract => "/v1/extract",
        }
    }
}

/// Every tool definition, in listing order.
pub fn definitions() -> Vec<ToolDefinition> {
    Tool::ALL.iter().map(Tool::definition).collect()
}

/// Wrap a Firecrawl response as an MCP tool result.
pub fn tool_result(body: &Value) -> Value {
    let text = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": false,
    })
}

/// An MCP tool result reporting a failed call.
pub fn tool_error(message: &str) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }],
        "isError": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<(String, String, Value)>>,
    }

    #[async_trait]
    impl FirecrawlApi for RecordingApi {
        async fn post(&self, path: &str, body: Value) -> Result<Value> {
            self.calls.lock().push(("POST".into(), path.into(), body));
            Ok(json!({ "success": true }))
        }

        async fn get(&self, path: &str) -> Result<Value> {
            self.calls.lock().push(("GET".into(), path.into(), Value::Null));
            Ok(json!({ "status": "completed" }))
        }
    }

    #[test]
    fn test_definitions_cover_every_tool() {
        let defs = definitions();
        assert_eq!(defs.len(), 7);
        assert!(defs.iter().all(|d| d.name.starts_with("firecrawl_")));

        let scrape = serde_json::to_value(&defs[0]).unwrap();
        assert_eq!(scrape["name"], "firecrawl_scrape");
        assert_eq!(scrape["inputSchema"]["required"], json!(["url"]));
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(Tool::from_name("firecrawl_map"), Some(Tool::Map));
        assert_eq!(Tool::from_name("map"), None);
    }

    #[tokio::test]
    async fn test_scrape_posts_arguments() {
        let api = RecordingApi::default();
        let args = json!({ "url": "https://example.com", "formats": ["markdown"] });

        Tool::Scrape.invoke(&api, args.clone()).await.unwrap();

        let calls = api.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("POST".to_string(), "/v1/scrape".to_string(), args));
    }

    #[tokio::test]
    async fn test_crawl_status_uses_get() {
        let api = RecordingApi::default();

        Tool::CheckCrawlStatus
            .invoke(&api, json!({ "id": "abc-123" }))
            .await
            .unwrap();

        assert_eq!(api.calls.lock()[0].1, "/v1/crawl/abc-123");
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let api = RecordingApi::default();

        let err = Tool::Search.invoke(&api, json!({})).await.unwrap_err();
        assert!(matches!(err, FiregateError::InvalidParams(_)));

        let err = Tool::Extract
            .invoke(&api, json!({ "urls": [] }))
            .await
            .unwrap_err();
        assert!(matches!(err, FiregateError::InvalidParams(_)));

        let err = Tool::Scrape.invoke(&api, json!("https://example.com")).await.unwrap_err();
        assert!(matches!(err, FiregateError::InvalidParams(_)));
        assert!(api.calls.lock().is_empty());
    }

    #[test]
    fn test_result_wrapping() {
        let result = tool_result(&json!({ "markdown": "# Hi" }));
        assert_eq!(result["isError"], false);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("# Hi"));

        assert_eq!(tool_error("boom")["isError"], true);
    }
}
