use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use firegate::config::FiregateConfig;
use firegate::error::{FiregateError, Result, RATE_LIMITED_CODE};
use firegate::mcp::{self, FirecrawlApi, McpServer};
use firegate::ratelimit::{Operation, RateLimitConfig};

/// Firecrawl stand-in that echoes the request, or fails every call.
#[derive(Default)]
struct MockFirecrawl {
    calls: AtomicUsize,
    fail: bool,
}

impl MockFirecrawl {
    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    fn respond(&self, path: &str, body: Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FiregateError::Upstream {
                status: Some(502),
                message: "bad gateway".to_string(),
                retryable: true,
            });
        }
        Ok(json!({ "success": true, "path": path, "request": body }))
    }
}

#[async_trait]
impl FirecrawlApi for MockFirecrawl {
    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.respond(path, body)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.respond(path, Value::Null)
    }
}

fn config_with_scrape_limit(per_minute: u32) -> FiregateConfig {
    let mut rate_limiting =
        RateLimitConfig::default().with_operation(Operation::Scrape, per_minute, 1000);
    rate_limiting.burst_enabled = false;

    FiregateConfig {
        rate_limiting,
        ..Default::default()
    }
}

fn server(config: &FiregateConfig, api: Arc<MockFirecrawl>) -> McpServer {
    mcp::build_server(config, api).unwrap()
}

async fn request(server: &McpServer, id: u64, method: &str, params: Value) -> Value {
    let line = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }).to_string();
    let response = server.handle_line(&line).await.expect("requests get a response");
    serde_json::from_str(&response).unwrap()
}

fn scrape_params() -> Value {
    json!({ "name": "firecrawl_scrape", "arguments": { "url": "https://example.com" } })
}

#[tokio::test]
async fn initialize_and_list_tools() {
    let server = server(&FiregateConfig::default(), Arc::new(MockFirecrawl::default()));

    let init = request(
        &server,
        1,
        "initialize",
        json!({ "protocolVersion": "2024-11-05", "clientInfo": { "name": "inspector" } }),
    )
    .await;
    assert_eq!(init["result"]["serverInfo"]["name"], "firegate");
    assert_eq!(server.session_client_id().as_deref(), Some("inspector"));

    let tools = request(&server, 2, "tools/list", json!({})).await;
    let names: Vec<&str> = tools["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"firecrawl_scrape"));
    assert!(names.contains(&"firecrawl_check_crawl_status"));
    assert_eq!(names.len(), 7);
}

#[tokio::test]
async fn tool_call_reaches_firecrawl() {
    let api = Arc::new(MockFirecrawl::default());
    let server = server(&FiregateConfig::default(), api.clone());

    let response = request(&server, 1, "tools/call", scrape_params()).await;

    assert_eq!(response["result"]["isError"], false);
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("/v1/scrape"));
    assert!(text.contains("https://example.com"));
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_arguments_are_rejected_before_firecrawl() {
    let api = Arc::new(MockFirecrawl::default());
    let server = server(&FiregateConfig::default(), api.clone());

    let response = request(
        &server,
        1,
        "tools/call",
        json!({ "name": "firecrawl_search", "arguments": {} }),
    )
    .await;

    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(api.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rate_limited_call_returns_json_rpc_error() {
    let api = Arc::new(MockFirecrawl::default());
    let server = server(&config_with_scrape_limit(2), api.clone());

    for id in 0..2 {
        let response = request(&server, id, "tools/call", scrape_params()).await;
        assert_eq!(response["result"]["isError"], false);
    }

    let response = request(&server, 2, "tools/call", scrape_params()).await;
    let error = &response["error"];

    assert_eq!(error["code"], RATE_LIMITED_CODE);
    assert!(error["message"]
        .as_str()
        .unwrap()
        .starts_with("Rate limit exceeded for scrape operations (per minute). Retry in"));
    assert_eq!(error["data"]["scope"], "scrape per minute");
    assert_eq!(error["data"]["limit"], 2.0);
    assert_eq!(api.calls.load(Ordering::SeqCst), 2);

    // Other operations keep their own quota.
    let response = request(
        &server,
        3,
        "tools/call",
        json!({ "name": "firecrawl_map", "arguments": { "url": "https://example.com" } }),
    )
    .await;
    assert_eq!(response["result"]["isError"], false);
}

#[tokio::test]
async fn status_resource_and_reset() {
    let server = server(&config_with_scrape_limit(2), Arc::new(MockFirecrawl::default()));

    request(
        &server,
        1,
        "initialize",
        json!({ "clientInfo": { "name": "alice" } }),
    )
    .await;
    request(&server, 2, "tools/call", scrape_params()).await;
    request(&server, 3, "tools/call", scrape_params()).await;

    let read = request(
        &server,
        4,
        "resources/read",
        json!({ "uri": "firegate://rate-limits?client=alice" }),
    )
    .await;
    let status: Value =
        serde_json::from_str(read["result"]["contents"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(status["client"]["scrape"]["minute"]["limit"], 2.0);
    assert_eq!(status["client"]["scrape"]["minute"]["remaining"], 0.0);
    assert!(status["global"]["hour"]["reset_time"].is_string());

    let reset = request(&server, 5, "ratelimit/reset", json!({ "client_id": "alice" })).await;
    assert_eq!(reset["result"], json!({}));

    let response = request(&server, 6, "tools/call", scrape_params()).await;
    assert_eq!(response["result"]["isError"], false);
}

#[tokio::test(start_paused = true)]
async fn upstream_failures_are_retried_then_reported_as_tool_errors() {
    let api = Arc::new(MockFirecrawl::failing());
    let server = server(&FiregateConfig::default(), api.clone());

    let response = request(&server, 1, "tools/call", scrape_params()).await;

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], true);
    assert!(response["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("bad gateway"));
    assert_eq!(api.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unknown_method_over_stdio_transport() {
    let server = server(&FiregateConfig::default(), Arc::new(MockFirecrawl::default()));
    let (mut client, server_end) = tokio::io::duplex(8192);
    let (server_read, server_write) = tokio::io::split(server_end);

    let serving = tokio::spawn(server.serve_io(BufReader::new(server_read), server_write));

    client
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"prompts/list\"}\n")
        .await
        .unwrap();

    let mut line = String::new();
    let mut reader = BufReader::new(&mut client);
    reader.read_line(&mut line).await.unwrap();
    let response: Value = serde_json::from_str(line.trim()).unwrap();

    assert_eq!(response["id"], 7);
    assert_eq!(response["error"]["code"], -32601);

    drop(reader);
    client.shutdown().await.unwrap();
    drop(client);
    serving.await.unwrap().unwrap();
}
