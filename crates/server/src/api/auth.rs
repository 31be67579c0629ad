//! Request gate.
//!
//! Every request passes through [`require_bearer`]. Discovery, health, docs and
//! the OAuth endpoints themselves are public, as are the introspection style
//! JSON-RPC methods MCP clients call before they have a token. Everything else
//! needs `Authorization: Bearer <access_token>` naming a live token.

use crate::mcp::jsonrpc::MethodProbe;
use crate::oauth2::OAuth2State;
use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Upper bound on request bodies the gate will buffer to find the JSON-RPC method.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/oauth/register",
    "/oauth/authorize",
    "/oauth/token",
    "/oauth/introspect",
    "/oauth/upstream/authorize",
    "/oauth/upstream/callback",
];

const PUBLIC_PREFIXES: &[&str] = &["/.well-known/", "/api-docs"];

/// JSON-RPC methods callable without a token.
pub const UNAUTHENTICATED_METHODS: &[&str] = &[
    "initialize",
    "initialized",
    "notifications/initialized",
    "ping",
    "tools/list",
];

/// The caller behind a validated access token.
#[derive(Debug, Clone)]
pub struct Identity {
    pub client_id: String,
    pub user_id: String,
    /// Scopes granted by the token
    pub scopes: Vec<String>,
    pub expires_at: OffsetDateTime,
}

impl Identity {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeError {
    MissingToken,
    InvalidToken,
}

impl ChallengeError {
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeError::MissingToken => "missing_token",
            ChallengeError::InvalidToken => "invalid_token",
        }
    }
}

/// Body of a 401 from the gate.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnauthorizedBody {
    pub error: String,
    pub error_description: String,
    pub resource_metadata_url: String,
}

/// A `401` carrying a `WWW-Authenticate: Bearer` challenge.
pub struct AuthChallenge {
    pub error: ChallengeError,
    pub realm: String,
    pub resource_metadata_url: String,
}

impl AuthChallenge {
    pub fn www_authenticate(&self) -> String {
        format!(
            "Bearer realm=\"{}\", resource_metadata=\"{}\", error=\"{}\"",
            self.realm,
            self.resource_metadata_url,
            self.error.as_str()
        )
    }
}

impl IntoResponse for AuthChallenge {
    fn into_response(self) -> Response {
        let challenge = self.www_authenticate();
        let body = UnauthorizedBody {
            error: "unauthorized".to_string(),
            error_description: format!("Authentication required: {}", self.error.as_str()),
            resource_metadata_url: self.resource_metadata_url,
        };
        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Extracts the token from `Authorization: Bearer <token>`. The scheme is matched
/// case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware enforcing bearer authentication.
pub async fn require_bearer(
    State(state): State<OAuth2State>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let bearer = extract_bearer_token(request.headers()).map(str::to_owned);
    if let Some(token) = bearer.as_deref()
        && let Some(access) = state.tokens.validate(token)
    {
        request.extensions_mut().insert(Identity {
            scopes: access.scopes(),
            client_id: access.client_id,
            user_id: access.user_id,
            expires_at: access.expires_at,
        });
        return next.run(request).await;
    }

    let (request, method) = match peek_method(request).await {
        Ok(peeked) => peeked,
        Err(response) => return response,
    };
    if let Some(method) = method.as_deref()
        && UNAUTHENTICATED_METHODS.contains(&method)
    {
        return next.run(request).await;
    }

    let error = if bearer.is_some() {
        ChallengeError::InvalidToken
    } else {
        ChallengeError::MissingToken
    };
    tracing::info!(
        path = %request.uri().path(),
        method = method.as_deref().unwrap_or("-"),
        error = error.as_str(),
        "rejected unauthenticated request"
    );
    AuthChallenge {
        error,
        realm: state.realm.clone(),
        resource_metadata_url: state.resource_metadata_url(),
    }
    .into_response()
}

/// Buffers a POST body to read its JSON-RPC method, then rebuilds the request.
async fn peek_method(request: Request) -> Result<(Request, Option<String>), Response> {
    if request.method() != Method::POST {
        return Ok((request, None));
    }
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "could not buffer request body");
            return Err(StatusCode::PAYLOAD_TOO_LARGE.into_response());
        }
    };
    let method = serde_json::from_slice::<MethodProbe>(&bytes)
        .ok()
        .map(|probe| probe.method);
    Ok((Request::from_parts(parts, Body::from(bytes)), method))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(extract_bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(extract_bearer_token(&headers("BEARER   abc ")), Some("abc"));
        assert_eq!(extract_bearer_token(&headers("Basic abc")), None);
        assert_eq!(extract_bearer_token(&headers("Bearer")), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn public_paths() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/.well-known/oauth-protected-resource"));
        assert!(is_public_path("/oauth/token"));
        assert!(is_public_path("/api-docs/openapi.json"));
        assert!(!is_public_path("/mcp"));
        assert!(!is_public_path("/"));
        assert!(!is_public_path("/oauth/tokens"));
    }

    #[test]
    fn challenge_format() {
        let challenge = AuthChallenge {
            error: ChallengeError::MissingToken,
            realm: "youtube-music".into(),
            resource_metadata_url: "https://mcp.example.com/.well-known/oauth-protected-resource"
                .into(),
        };
        assert_eq!(
            challenge.www_authenticate(),
            "Bearer realm=\"youtube-music\", resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\", error=\"missing_token\""
        );
        let response = challenge.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn identity_scopes() {
        let identity = Identity {
            client_id: "mcp_a".into(),
            user_id: "user_mcp_a".into(),
            scopes: vec!["mcp:tools".into()],
            expires_at: OffsetDateTime::now_utc(),
        };
        assert!(identity.has_scope("mcp:tools"));
        assert!(!identity.has_scope("youtube:manage_playlists"));
    }
}
