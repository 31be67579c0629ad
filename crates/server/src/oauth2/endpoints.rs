//! OAuth2 HTTP endpoints.
//!
//! Implements the authorization server endpoints used by MCP clients:
//! - Dynamic client registration
//! - Authorization endpoint (automatic approval, PKCE required)
//! - Token endpoint (authorization_code, refresh_token)
//! - Token introspection
//! - Discovery documents
//!
//! and the two endpoints that link a session to the upstream account.

use crate::AppResources;
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::{
    OAUTH2_TAG,
    clients::ClientMetadata,
    codes::CodeGrant,
    pkce::{self, S256},
    state::OAuth2State,
};
use axum::{
    Extension, Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, JsonRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the router nested under `/oauth`.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(introspect))
        .routes(routes!(upstream_authorize))
        .routes(routes!(upstream_callback))
        .with_state(state)
}

/// Creates the discovery router mounted at the root.
pub fn well_known_router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(protected_resource_metadata))
        .routes(routes!(authorization_server_metadata))
        .routes(routes!(jwks))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub client_id: String,
    pub client_secret: String,
    pub client_id_issued_at: i64,
    /// Always 0: secrets do not expire
    pub client_secret_expires_at: i64,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: String,
    pub token_endpoint_auth_method: String,
}

/// OAuth2 authorization request parameters.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Must be "code"
    pub response_type: Option<String>,
    /// Client identifier issued during registration
    pub client_id: String,
    /// Redirect URI (must match a registered URI)
    pub redirect_uri: Option<String>,
    /// Space-separated list of requested scopes
    pub scope: Option<String>,
    /// Opaque value for CSRF protection
    pub state: Option<String>,
    /// PKCE code challenge (base64url-encoded SHA-256 of the verifier)
    pub code_challenge: Option<String>,
    /// PKCE method, must be "S256"
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub code_verifier: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
    pub resource_documentation: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub introspection_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JwkSet {
    #[schema(value_type = Vec<Object>)]
    pub keys: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpstreamAuthorizeQuery {
    /// Session to bind the upstream credential to; a new one is created when absent
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpstreamCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpstreamLinkResponse {
    pub status: String,
    pub session_id: String,
    pub expires_in: i64,
}

// =============================================================================
// Endpoints
// =============================================================================

/// Dynamic client registration (RFC 7591).
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/register",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Register Client",
    summary = "Register an OAuth2 client",
    description = "Registers a client and returns its credentials. \
                   The secret is only returned here.\n\n\
                   At least one absolute `redirect_uri` is required. Omitted fields default to \
                   `authorization_code`/`refresh_token` grants, the `code` response type and the \
                   server's default scope.",
    request_body(content = ClientMetadata, content_type = "application/json"),
    responses(
        (status = 201, description = "Client registered", body = RegisterResponse),
        (status = 400, description = "Invalid client metadata", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<OAuth2State>,
    payload: Result<Json<ClientMetadata>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), OAuthError> {
    let Json(metadata) =
        payload.map_err(|e| OAuthError::InvalidClientMetadata(e.body_text()))?;
    let client = state.clients.register(metadata)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            client_id: client.client_id,
            client_secret: client.client_secret,
            client_id_issued_at: client.created_at.unix_timestamp(),
            client_secret_expires_at: 0,
            client_name: client.client_name,
            redirect_uris: client.redirect_uris,
            grant_types: client.grant_types,
            response_types: client.response_types,
            scope: client.scope,
            token_endpoint_auth_method: "client_secret_post".to_string(),
        }),
    ))
}

/// OAuth2 Authorization endpoint.
///
/// There is no consent screen: a valid request is approved immediately and
/// redirected back to the client with a code.
#[tracing::instrument(skip(state, params), fields(client_id = %params.client_id))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Request an authorization code",
    description = "Starts the Authorization Code flow. Valid requests are approved immediately and \
                   redirected to `redirect_uri` with `code` and the echoed `state`.\n\n\
                   **PKCE is mandatory:** send `code_challenge` with `code_challenge_method=S256`.\n\n\
                   Errors are reported by redirect once the client and redirect URI are known; \
                   an unknown client or unregistered redirect URI yields a JSON 400.",
    params(
        ("response_type" = String, Query, description = "Must be `code`."),
        ("client_id" = String, Query,
            description = "The client identifier issued during registration."),
        ("redirect_uri" = Option<String>, Query,
            description = "Registered redirect URI. \
                           May be omitted when the client registered exactly one."),
        ("scope" = Option<String>, Query,
            description = "Space-separated list of requested scopes."),
        ("state" = Option<String>, Query,
            description = "Opaque value returned unchanged in the redirect."),
        ("code_challenge" = String, Query,
            description = "Base64url-encoded SHA-256 hash of the code verifier."),
        ("code_challenge_method" = String, Query, description = "Must be `S256`."),
    ),
    responses(
        (status = 303, description = "Redirect back to the client with a code or an error"),
        (status = 400, description = "Unknown client or invalid redirect_uri", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    Query(params): Query<AuthorizeRequest>,
) -> Response {
    let Some(client) = state.clients.lookup(&params.client_id) else {
        tracing::warn!("authorization request for unknown client");
        return (
            StatusCode::BAD_REQUEST,
            Json(OAuthError::InvalidClient("Client not found".into()).to_body()),
        )
            .into_response();
    };

    // Never redirect to a URI the client did not register.
    let redirect_uri = match params.redirect_uri.as_deref() {
        Some(uri) if client.is_redirect_uri_allowed(uri) => uri.to_string(),
        Some(_) => {
            return OAuthError::InvalidRequest("Invalid redirect_uri".into()).into_response();
        }
        None => match client.default_redirect_uri() {
            Some(uri) => uri.to_string(),
            None => {
                return OAuthError::InvalidRequest("redirect_uri is required".into())
                    .into_response();
            }
        },
    };
    let client_state = params.state.as_deref();

    if params.response_type.as_deref() != Some("code") {
        return error_redirect(
            &redirect_uri,
            client_state,
            &OAuthError::UnsupportedResponseType,
        );
    }

    let Some(code_challenge) = params.code_challenge.as_deref() else {
        return error_redirect(
            &redirect_uri,
            client_state,
            &OAuthError::InvalidRequest("code_challenge is required".into()),
        );
    };
    if params.code_challenge_method.as_deref() != Some(S256) {
        return error_redirect(
            &redirect_uri,
            client_state,
            &OAuthError::InvalidRequest("code_challenge_method must be S256".into()),
        );
    }
    if !pkce::is_well_formed(code_challenge) {
        return error_redirect(
            &redirect_uri,
            client_state,
            &OAuthError::InvalidRequest("Malformed code_challenge".into()),
        );
    }

    let Some(scope) = state.negotiate_scope(params.scope.as_deref()) else {
        return error_redirect(
            &redirect_uri,
            client_state,
            &OAuthError::InvalidScope("None of the requested scopes are supported".into()),
        );
    };

    let code = state.codes.issue(CodeGrant {
        client_id: client.client_id.clone(),
        redirect_uri: redirect_uri.clone(),
        scope,
        code_challenge: code_challenge.to_string(),
        user_id: format!("user_{}", client.client_id),
    });
    tracing::info!("issued authorization code");

    let mut target = match url::Url::parse(&redirect_uri) {
        Ok(u) => u,
        Err(_) => {
            return OAuthError::InvalidRequest("Invalid redirect_uri".into()).into_response();
        }
    };
    target.query_pairs_mut().append_pair("code", &code);
    if let Some(s) = client_state {
        target.query_pairs_mut().append_pair("state", s);
    }
    Redirect::to(target.as_str()).into_response()
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(state, headers, payload))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token for an access token",
    description = "**Supported grant types:**\n\
                   - `authorization_code`: requires client authentication, `code` and the PKCE `code_verifier`\n\
                   - `refresh_token`: issues a new access token for the same grant; the refresh token is not rotated\n\n\
                   **Client authentication:** HTTP Basic or `client_id`/`client_secret` form fields.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or PKCE verifier", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    payload: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(params) = payload.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;

    let response = match params.grant_type.as_deref() {
        Some("authorization_code") => authorization_code_grant(&state, &headers, params)?,
        Some("refresh_token") => refresh_token_grant(&state, &headers, params)?,
        Some(_) => return Err(OAuthError::UnsupportedGrantType),
        None => return Err(OAuthError::InvalidRequest("grant_type is required".into())),
    };

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(response)).into_response())
}

fn authorization_code_grant(
    state: &OAuth2State,
    headers: &HeaderMap,
    params: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let (client_id, client_secret) = extract_client_credentials(
        headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    );
    let client_id =
        client_id.ok_or_else(|| OAuthError::InvalidRequest("client_id is required".into()))?;
    let client = state
        .clients
        .authenticate(&client_id, client_secret.as_deref())?;

    let code = params
        .code
        .ok_or_else(|| OAuthError::InvalidRequest("code is required".into()))?;
    let code_verifier = params
        .code_verifier
        .ok_or_else(|| OAuthError::InvalidRequest("code_verifier is required".into()))?;

    let record = state.codes.redeem(
        &code,
        &client.client_id,
        params.redirect_uri.as_deref(),
        &code_verifier,
    )?;
    let token = state
        .tokens
        .issue(&client.client_id, &record.user_id, &record.scope, None);

    Ok(TokenResponse {
        access_token: token.token,
        token_type: "Bearer".to_string(),
        expires_in: state.access_token_lifetime(),
        refresh_token: token.refresh_token,
        scope: token.scope,
    })
}

fn refresh_token_grant(
    state: &OAuth2State,
    headers: &HeaderMap,
    params: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let refresh_token = params
        .refresh_token
        .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".into()))?;

    // Client binding is only checked when the caller identifies itself.
    let (client_id, client_secret) = extract_client_credentials(
        headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    );
    let bound_client = match client_id {
        Some(id) => Some(
            state
                .clients
                .authenticate(&id, client_secret.as_deref())?
                .client_id,
        ),
        None => None,
    };

    let token = state
        .tokens
        .refresh(&refresh_token, bound_client.as_deref())?;

    Ok(TokenResponse {
        access_token: token.token,
        token_type: "Bearer".to_string(),
        expires_in: state.access_token_lifetime(),
        refresh_token: None,
        scope: token.scope,
    })
}

/// Token introspection (RFC 7662).
#[tracing::instrument(skip(state, headers, payload))]
#[utoipa::path(
    post,
    path = "/introspect",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Introspect Token",
    summary = "Check whether an access token is active",
    description = "Returns the token's metadata when it is a live access token, otherwise \
                   `{\"active\": false}`. Requires client authentication.",
    request_body(
        content = IntrospectRequest,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Introspection result", body = IntrospectResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn introspect(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    payload: Result<Form<IntrospectRequest>, FormRejection>,
) -> Result<Json<IntrospectResponse>, OAuthError> {
    let Form(params) = payload.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;
    let (client_id, client_secret) = extract_client_credentials(
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    );
    let client_id = client_id
        .ok_or_else(|| OAuthError::InvalidClient("Client authentication required".into()))?;
    state
        .clients
        .authenticate(&client_id, client_secret.as_deref())?;

    let Some(token) = state.tokens.validate(&params.token) else {
        return Ok(Json(IntrospectResponse::default()));
    };

    Ok(Json(IntrospectResponse {
        active: true,
        scope: Some(token.scope),
        client_id: Some(token.client_id),
        sub: Some(token.user_id),
        exp: Some(token.expires_at.unix_timestamp()),
        iat: Some(token.issued_at.unix_timestamp()),
        token_type: Some("Bearer".to_string()),
    }))
}

/// Starts linking a session to the upstream account.
#[tracing::instrument(skip(resources, headers, params))]
#[utoipa::path(
    get,
    path = "/upstream/authorize",
    tag = OAUTH2_TAG,
    operation_id = "Upstream Authorize",
    summary = "Link the music account",
    description = "Redirects the browser to the upstream identity provider. After consent the provider \
                   returns to `/oauth/upstream/callback`, which binds the credential to `session_id`.\n\n\
                   With `Accept: application/json` the authorization URL is returned instead of a redirect.",
    params(
        ("session_id" = Option<String>, Query, description = "Session to link. A new session is created when omitted."),
    ),
    responses(
        (status = 303, description = "Redirect to the identity provider"),
        (status = 200, description = "Authorization URL", body = crate::oauth2::upstream::AuthorizationStart),
        (status = 400, description = "Unknown session", body = ErrorResponse),
        (status = 500, description = "Upstream OAuth is not configured", body = ErrorResponse),
    )
)]
pub async fn upstream_authorize(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Query(params): Query<UpstreamAuthorizeQuery>,
) -> Result<Response, OAuthError> {
    let session_id = match params.session_id {
        Some(id) => resources
            .sessions
            .get_session(&id)
            .await
            .map(|s| s.session_id)
            .ok_or_else(|| OAuthError::InvalidRequest("Unknown session_id".into()))?,
        None => resources.sessions.create_session().session_id,
    };

    let callback = resources.config.endpoint_url("/oauth/upstream/callback");
    let start = resources
        .upstream
        .begin_authorization(&callback, Some(session_id))?;

    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if wants_json {
        Ok(Json(start).into_response())
    } else {
        Ok(Redirect::to(&start.auth_url).into_response())
    }
}

/// Redirect target of the upstream identity provider.
#[tracing::instrument(skip(resources, params))]
#[utoipa::path(
    get,
    path = "/upstream/callback",
    tag = OAUTH2_TAG,
    operation_id = "Upstream Callback",
    summary = "Complete linking the music account",
    description = "Exchanges the provider's code and binds the resulting credential to the session that \
                   started the flow. Upstream tokens are never returned.",
    params(
        ("code" = Option<String>, Query, description = "Provider authorization code"),
        ("state" = Option<String>, Query, description = "State minted by `/oauth/upstream/authorize`"),
        ("error" = Option<String>, Query, description = "Provider error, if consent was denied"),
    ),
    responses(
        (status = 200, description = "Session authenticated", body = UpstreamLinkResponse),
        (status = 400, description = "Missing parameters, unknown state or rejected code", body = ErrorResponse),
        (status = 503, description = "Identity provider unreachable", body = ErrorResponse),
    )
)]
pub async fn upstream_callback(
    Extension(resources): Extension<AppResources>,
    Query(params): Query<UpstreamCallbackQuery>,
) -> Result<Json<UpstreamLinkResponse>, OAuthError> {
    if let Some(error) = params.error {
        tracing::warn!(%error, "upstream authorization denied");
        return Err(OAuthError::InvalidGrant(format!(
            "Upstream authorization failed: {error}"
        )));
    }
    let code = params
        .code
        .ok_or_else(|| OAuthError::InvalidRequest("code is required".into()))?;
    let state = params
        .state
        .ok_or_else(|| OAuthError::InvalidRequest("state is required".into()))?;

    let (pending, credential) = resources
        .upstream
        .exchange_code(&code, &state)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "upstream code exchange failed"))?;

    let session_id = pending
        .session_id
        .ok_or_else(|| {
            OAuthError::InvalidRequest("Authorization is not tied to a session".into())
        })?;
    let expires_in = credential.expires_in();
    resources
        .sessions
        .bind_credential(&session_id, credential)
        .await
        .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;

    Ok(Json(UpstreamLinkResponse {
        status: "authenticated".to_string(),
        session_id,
        expires_in,
    }))
}

/// Protected resource metadata (RFC 9728).
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/oauth-protected-resource",
    tag = OAUTH2_TAG,
    operation_id = "Protected Resource Metadata",
    summary = "Discover the authorization server protecting this resource",
    responses(
        (status = 200, description = "Protected resource metadata", body = ProtectedResourceMetadata),
    )
)]
pub async fn protected_resource_metadata(
    State(state): State<OAuth2State>,
) -> Json<ProtectedResourceMetadata> {
    Json(ProtectedResourceMetadata {
        resource: state.issuer_url.clone(),
        authorization_servers: vec![state.issuer_url.clone()],
        scopes_supported: state.scopes_supported.clone(),
        bearer_methods_supported: vec!["header".to_string()],
        resource_documentation: state.endpoint("/api-docs"),
    })
}

/// Authorization server metadata (RFC 8414).
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/oauth-authorization-server",
    tag = OAUTH2_TAG,
    operation_id = "Authorization Server Metadata",
    summary = "OAuth2 authorization server metadata",
    responses(
        (status = 200, description = "Authorization server metadata", body = AuthorizationServerMetadata),
    )
)]
pub async fn authorization_server_metadata(
    State(state): State<OAuth2State>,
) -> Json<AuthorizationServerMetadata> {
    Json(AuthorizationServerMetadata {
        issuer: state.issuer_url.clone(),
        authorization_endpoint: state.endpoint("/oauth/authorize"),
        token_endpoint: state.endpoint("/oauth/token"),
        registration_endpoint: state.endpoint("/oauth/register"),
        introspection_endpoint: state.endpoint("/oauth/introspect"),
        jwks_uri: state.endpoint("/.well-known/jwks.json"),
        scopes_supported: state.scopes_supported.clone(),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ],
        token_endpoint_auth_methods_supported: vec![
            "client_secret_post".to_string(),
            "client_secret_basic".to_string(),
        ],
        code_challenge_methods_supported: vec![S256.to_string()],
    })
}

/// Key set. Tokens are opaque, so it is empty.
#[tracing::instrument]
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = OAUTH2_TAG,
    operation_id = "JWKS",
    summary = "JSON Web Key Set",
    responses(
        (status = 200, description = "Key set", body = JwkSet),
    )
)]
pub async fn jwks() -> Json<JwkSet> {
    Json(JwkSet { keys: Vec::new() })
}

// =============================================================================
// Helpers
// =============================================================================

/// Client credentials from HTTP Basic, falling back to the form body.
fn extract_client_credentials(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> (Option<String>, Option<String>) {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, auth.trim())
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        let id = urlencoding::decode(id).map(|s| s.into_owned()).unwrap_or_else(|_| id.to_string());
        let secret = urlencoding::decode(secret)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| secret.to_string());
        return (Some(id), Some(secret));
    }

    (
        form_client_id.map(String::from),
        form_client_secret.map(String::from),
    )
}

fn error_redirect(redirect_uri: &str, state: Option<&str>, error: &OAuthError) -> Response {
    let mut redirect_url = match url::Url::parse(redirect_uri) {
        Ok(u) => u,
        Err(_) => return error.clone().into_response(),
    };

    redirect_url
        .query_pairs_mut()
        .append_pair("error", error.error_code());
    if let Some(desc) = error.description() {
        redirect_url
            .query_pairs_mut()
            .append_pair("error_description", desc);
    }
    if let Some(s) = state {
        redirect_url.query_pairs_mut().append_pair("state", s);
    }
    tracing::info!(error = error.error_code(), "authorization request rejected");

    Redirect::to(redirect_url.as_str()).into_response()
}
