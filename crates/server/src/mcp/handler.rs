//! Tool Dispatcher: the JSON-RPC endpoint MCP clients talk to.
//!
//! Every call is correlated with a [`Session`] through the `Mcp-Session-Id`
//! header. Sessions are created on first contact and the id is echoed on
//! every response. A session belongs to the first OAuth client that calls
//! with it; other clients naming the same id get a session of their own.
//! Tool calls resolve an upstream credential through the configured
//! [`crate::credentials::CredentialProvider`] before touching the music API.

use crate::AppResources;
use crate::api::auth::{Identity, MAX_BODY_BYTES};
use crate::error::{MusicApiError, ToolError};
use crate::mcp::jsonrpc::{
    AUTHENTICATION_REQUIRED, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::mcp::MCP_TAG;
use crate::mcp::tools::{self, ToolHandler};
use crate::session::Session;
use axum::{
    Extension, Json,
    extract::Request,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

pub const SESSION_HEADER: &str = "mcp-session-id";

pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// JSON-RPC endpoint.
#[tracing::instrument(skip(resources, request))]
#[utoipa::path(
    post,
    path = "/mcp",
    tag = MCP_TAG,
    operation_id = "MCP JSON-RPC",
    summary = "Invoke an MCP method",
    description = "Accepts a single JSON-RPC 2.0 message.\n\n\
                   `initialize`, `notifications/initialized`, `ping` and `tools/list` may be called \
                   without a bearer token. `tools/call` requires `Authorization: Bearer <access_token>` \
                   and a linked upstream account; when the account is not linked the error carries \
                   `data.authorization_url`.\n\n\
                   The `Mcp-Session-Id` response header identifies the session; send it back on \
                   subsequent calls.",
    request_body(content = JsonRpcRequest, content_type = "application/json"),
    params(
        ("Mcp-Session-Id" = Option<String>, Header, description = "Session identifier returned by a previous call"),
    ),
    responses(
        (status = 200, description = "JSON-RPC response", body = JsonRpcResponse),
        (status = 202, description = "Notification accepted"),
        (status = 400, description = "Malformed JSON-RPC message", body = JsonRpcResponse),
        (status = 401, description = "Bearer token missing or invalid"),
    ),
    security(("bearer" = []))
)]
pub async fn mcp_post(
    Extension(resources): Extension<AppResources>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let identity = parts.extensions.get::<Identity>().cloned();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let requested_session = parts
        .headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    let client_id = identity.as_ref().map(|i| i.client_id.as_str());
    let session = resources
        .sessions
        .get_or_create(requested_session, client_id)
        .await;

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => {
            return with_session(&session.session_id, (StatusCode::BAD_REQUEST, Json(response)));
        }
    };

    tracing::debug!(
        method = %request.method,
        session_id = %session.session_id,
        client_id,
        "dispatching JSON-RPC call"
    );

    match dispatch(&resources, &session, request).await {
        Some(response) => with_session(&session.session_id, Json(response)),
        None => with_session(&session.session_id, StatusCode::ACCEPTED),
    }
}

/// Ends a session.
#[tracing::instrument(skip(resources, request))]
#[utoipa::path(
    delete,
    path = "/mcp",
    tag = MCP_TAG,
    operation_id = "MCP End Session",
    summary = "Terminate an MCP session",
    description = "Drops the session named by the `Mcp-Session-Id` header together with any upstream \
                   credential bound to it.",
    params(
        ("Mcp-Session-Id" = String, Header, description = "Session to terminate"),
    ),
    responses(
        (status = 204, description = "Session terminated"),
        (status = 400, description = "Missing Mcp-Session-Id header"),
        (status = 404, description = "Unknown session, or one owned by another client"),
    ),
    security(("bearer" = []))
)]
pub async fn mcp_delete(
    Extension(resources): Extension<AppResources>,
    request: Request,
) -> StatusCode {
    let Some(session_id) = request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return StatusCode::BAD_REQUEST;
    };
    let client_id = request
        .extensions()
        .get::<Identity>()
        .map(|i| i.client_id.as_str());
    let owned = resources
        .sessions
        .get_session(session_id)
        .await
        .is_some_and(|session| session.is_accessible_by(client_id));
    if owned && resources.sessions.remove(session_id) {
        tracing::info!(session_id, "session terminated by client");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        JsonRpcResponse::failure(None, JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")))
    })?;
    if value.is_array() {
        return Err(JsonRpcResponse::failure(
            None,
            JsonRpcError::new(INVALID_REQUEST, "Batch requests are not supported"),
        ));
    }
    let id = value.get("id").cloned();
    let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::failure(
            id.clone(),
            JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
        )
    })?;
    if let Some(version) = request.jsonrpc.as_deref()
        && version != JSONRPC_VERSION
    {
        return Err(JsonRpcResponse::failure(
            id,
            JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        ));
    }
    Ok(request)
}

/// Runs one call. Returns `None` for notifications, which get no reply.
async fn dispatch(
    resources: &AppResources,
    session: &Session,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    if request.is_notification()
        || matches!(
            request.method.as_str(),
            "initialized" | "notifications/initialized"
        )
    {
        tracing::debug!(method = %request.method, "notification received");
        return None;
    }

    let id = request.id.clone();
    let params = request.params();
    let outcome = match request.method.as_str() {
        "initialize" => Ok(initialize(resources, session, &params).await),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(tools::list()),
        "tools/call" => call_tool(resources, session, params).await,
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

async fn initialize(resources: &AppResources, session: &Session, params: &Value) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let protocol_version = requested
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(LATEST_PROTOCOL_VERSION);

    if let Some(client_info) = params.get("clientInfo") {
        resources
            .sessions
            .record_client_info(&session.session_id, client_info.clone())
            .await;
    }
    tracing::info!(
        session_id = %session.session_id,
        protocol_version,
        "client initialized"
    );

    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": resources.config.service_name,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn call_tool(
    resources: &AppResources,
    session: &Session,
    params: Value,
) -> Result<Value, JsonRpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing tool name"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    match run_tool(resources, session, name, arguments).await {
        Ok(payload) => Ok(tools::text_content(&payload, false)),
        Err(ToolError::UnknownTool(name)) => Err(JsonRpcError::new(
            INVALID_PARAMS,
            format!("Unknown tool: {name}"),
        )),
        Err(ToolError::InvalidParams(reason)) => Err(JsonRpcError::new(
            INVALID_PARAMS,
            format!("Invalid arguments for {name}: {reason}"),
        )),
        Err(ToolError::Session(err)) => Err(authentication_required(session, &err.to_string())),
        Err(ToolError::MusicApi(MusicApiError::Unauthorized)) => Err(authentication_required(
            session,
            "The music service rejected the linked credential",
        )),
        Err(ToolError::MusicApi(err)) => {
            tracing::warn!(tool = name, error = %err, "tool call failed");
            Ok(tools::text_content(&json!({ "error": err.to_string() }), true))
        }
    }
}

/// Runs a tool. A music tool whose credential is rejected gets one retry
/// with a refreshed credential.
async fn run_tool(
    resources: &AppResources,
    session: &Session,
    name: &str,
    arguments: Value,
) -> Result<Value, ToolError> {
    let tool = tools::find(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
    let handler = match tool.handler {
        ToolHandler::Status(handler) => return handler(resources, session, arguments).await,
        ToolHandler::Music(handler) => handler,
    };

    let session_id = session.session_id.as_str();
    let credential = resources.credentials.resolve(session_id).await?;
    match handler(&resources.music, &credential, arguments.clone()).await {
        Err(ToolError::MusicApi(MusicApiError::Unauthorized)) => {}
        outcome => return outcome,
    }

    let Some(fresh) = resources.credentials.recover(session_id, &credential).await? else {
        return Err(MusicApiError::Unauthorized.into());
    };
    let outcome = handler(&resources.music, &fresh, arguments).await;
    if matches!(outcome, Err(ToolError::MusicApi(MusicApiError::Unauthorized))) {
        resources.credentials.revoke(session_id).await;
    }
    outcome
}

fn authentication_required(session: &Session, reason: &str) -> JsonRpcError {
    JsonRpcError::new(
        AUTHENTICATION_REQUIRED,
        format!(
            "Authentication required: {reason}. Link your music account at {}",
            session.authorization_url
        ),
    )
    .with_data(json!({
        "authorization_url": session.authorization_url,
        "session_id": session.session_id,
    }))
}

fn with_session(session_id: &str, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_garbage_and_batches() {
        let err = parse_request(b"{not json").unwrap_err();
        assert_eq!(err.error.unwrap().code, PARSE_ERROR);

        let err = parse_request(br#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert_eq!(err.error.unwrap().code, INVALID_REQUEST);

        let err = parse_request(br#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert_eq!(err.id, json!(1));
        assert_eq!(err.error.unwrap().code, INVALID_REQUEST);

        let err = parse_request(br#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).unwrap_err();
        assert_eq!(err.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn parse_accepts_notifications() {
        let request =
            parse_request(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(request.is_notification());
    }
}
