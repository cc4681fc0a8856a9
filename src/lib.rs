//! Firegate - rate-limited MCP server for the Firecrawl API
//!
//! Requests arrive as JSON-RPC over stdio and pass through a middleware
//! chain (logging, timing, error handling, rate limiting, retry, circuit
//! breaking) before reaching the Firecrawl tool handlers. Rate limiting uses
//! either token buckets with global, per-client and per-operation scopes, or
//! per-client sliding windows.

pub mod config;
pub mod error;
pub mod mcp;
pub mod middleware;
pub mod ratelimit;
