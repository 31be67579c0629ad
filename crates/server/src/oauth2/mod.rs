//! OAuth2 authorization server.
//!
//! Issues opaque bearer tokens to MCP clients through the Authorization Code
//! flow with mandatory PKCE (S256), and links each client session to an
//! account at the upstream identity provider.
//!
//! ## Endpoints
//!
//! - `POST /oauth/register` - Dynamic client registration (RFC 7591)
//! - `GET /oauth/authorize` - Authorization endpoint
//! - `POST /oauth/token` - Token endpoint
//! - `POST /oauth/introspect` - Token introspection (RFC 7662)
//! - `GET /oauth/upstream/authorize` - Start linking the upstream account
//! - `GET /oauth/upstream/callback` - Upstream redirect target
//! - `GET /.well-known/oauth-authorization-server` - Server metadata (RFC 8414)
//! - `GET /.well-known/oauth-protected-resource` - Resource metadata (RFC 9728)

pub mod clients;
pub mod codes;
pub mod endpoints;
pub mod pkce;
mod state;
pub mod tokens;
pub mod upstream;

pub use endpoints::{router, well_known_router};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
