//! MCP tool surface.
//!
//! - `jsonrpc` - JSON-RPC 2.0 envelopes and error codes
//! - `tools` - static tool registry
//! - `handler` - HTTP endpoint and method dispatch

pub mod handler;
pub mod jsonrpc;
pub mod tools;

use utoipa_axum::{router::OpenApiRouter, routes};

/// OpenAPI tag for the MCP endpoint
pub const MCP_TAG: &str = "MCP";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(handler::mcp_post, handler::mcp_delete))
}
