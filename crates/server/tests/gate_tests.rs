//! Bearer gate tests.

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::TestServer;
use music_mcp_server::{
    AppResources,
    api::build_router,
    config::AppConfig,
    mcp::handler::SESSION_HEADER,
    oauth2::{clients::ClientMetadata, codes::CodeGrant, pkce},
};
use serde_json::{Value, json};

fn create_test_config() -> AppConfig {
    AppConfig {
        public_url: "https://mcp.example.com".into(),
        ..AppConfig::default()
    }
}

fn create_test_server() -> (TestServer, AppResources) {
    let resources = AppResources::new(create_test_config()).expect("build resources");
    let server = TestServer::new(build_router(resources.clone())).expect("create test server");
    (server, resources)
}

/// Issues an access token directly through the stores.
fn issue_access_token(resources: &AppResources) -> String {
    let oauth2 = &resources.oauth2;
    let client = oauth2
        .clients
        .register(ClientMetadata {
            client_name: Some("Gate Test".into()),
            redirect_uris: vec!["https://client.example/cb".into()],
            grant_types: None,
            response_types: None,
            scope: None,
        })
        .expect("register client");
    let pair = pkce::generate();
    let code = oauth2.codes.issue(CodeGrant {
        client_id: client.client_id.clone(),
        redirect_uri: "https://client.example/cb".into(),
        scope: "mcp:tools".into(),
        code_challenge: pair.code_challenge,
        user_id: format!("user_{}", client.client_id),
    });
    let record = oauth2
        .codes
        .redeem(
            &code,
            &client.client_id,
            Some("https://client.example/cb"),
            &pair.code_verifier,
        )
        .expect("redeem code");
    oauth2
        .tokens
        .issue(&record.client_id, &record.user_id, &record.scope, None)
        .token
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

fn rpc(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params })
}

#[tokio::test]
async fn test_tool_call_without_token_is_challenged() {
    let (server, _) = create_test_server();

    let response = server
        .post("/mcp")
        .json(&rpc("tools/call", json!({ "name": "get_playlists" })))
        .await;

    response.assert_status_unauthorized();
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .expect("WWW-Authenticate header")
        .to_string();
    assert!(challenge.starts_with("Bearer "));
    assert!(challenge.contains("realm=\"youtube-music\""));
    assert!(challenge.contains("error=\"missing_token\""));
    assert!(challenge.contains(
        "resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\""
    ));

    let body: Value = response.json();
    assert_eq!(
        body["resource_metadata_url"],
        "https://mcp.example.com/.well-known/oauth-protected-resource"
    );
}

#[tokio::test]
async fn test_invalid_token_is_challenged() {
    let (server, _) = create_test_server();

    let response = server
        .post("/mcp")
        .add_header(header::AUTHORIZATION, bearer("mcp_not_a_real_token"))
        .json(&rpc("tools/call", json!({ "name": "get_playlists" })))
        .await;

    response.assert_status_unauthorized();
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(challenge.contains("error=\"invalid_token\""));
}

#[tokio::test]
async fn test_handshake_methods_are_open() {
    let (server, _) = create_test_server();

    let response = server
        .post("/mcp")
        .json(&rpc(
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "clientInfo": { "name": "gate-test", "version": "1.0" }
            }),
        ))
        .await;
    response.assert_status_ok();
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("session header")
        .to_string();
    let body: Value = response.json();
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");

    let response = server
        .post("/mcp")
        .add_header(
            HeaderName::from_static(SESSION_HEADER),
            HeaderValue::from_str(&session_id).unwrap(),
        )
        .json(&rpc("tools/list", json!({})))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.headers().get(SESSION_HEADER).unwrap(),
        session_id.as_str()
    );
    let body: Value = response.json();
    assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 5);

    let response = server.post("/mcp").json(&rpc("ping", json!({}))).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["result"], json!({}));
}

#[tokio::test]
async fn test_initialized_notification_is_accepted() {
    let (server, _) = create_test_server();

    let response = server
        .post("/mcp")
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_invalid_token_does_not_block_open_methods() {
    let (server, _) = create_test_server();

    let response = server
        .post("/mcp")
        .add_header(header::AUTHORIZATION, bearer("mcp_stale"))
        .json(&rpc("tools/list", json!({})))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_valid_token_reaches_tool_dispatch() {
    let (server, resources) = create_test_server();
    let token = issue_access_token(&resources);

    // Scheme matching is case-insensitive.
    let response = server
        .post("/mcp")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("bearer {token}")).unwrap(),
        )
        .json(&rpc("tools/call", json!({ "name": "get_playlists", "arguments": {} })))
        .await;

    response.assert_status_ok();
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("session header")
        .to_string();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["error"]["data"]["session_id"], session_id);
    assert_eq!(
        body["error"]["data"]["authorization_url"],
        format!("https://mcp.example.com/oauth/upstream/authorize?session_id={session_id}")
    );
}

#[tokio::test]
async fn test_root_path_is_gated_like_mcp() {
    let (server, resources) = create_test_server();

    server
        .post("/")
        .json(&rpc("tools/call", json!({ "name": "get_playlists" })))
        .await
        .assert_status_unauthorized();

    let token = issue_access_token(&resources);
    let response = server
        .post("/")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&rpc("tools/list", json!({})))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_public_endpoints_need_no_token() {
    let (server, _) = create_test_server();

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "youtube-music-mcp");

    server
        .get("/.well-known/oauth-protected-resource")
        .await
        .assert_status_ok();
    server
        .get("/.well-known/oauth-authorization-server")
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_session_delete_requires_token() {
    let (server, resources) = create_test_server();
    let session = resources.sessions.create_session();

    server
        .delete("/mcp")
        .add_header(
            HeaderName::from_static(SESSION_HEADER),
            HeaderValue::from_str(&session.session_id).unwrap(),
        )
        .await
        .assert_status_unauthorized();
    assert!(resources.sessions.get_session(&session.session_id).await.is_some());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (server, _) = create_test_server();
    let padding = "x".repeat(2 * 1024 * 1024);

    let response = server
        .post("/mcp")
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping", "padding": padding }))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_unknown_method_with_token() {
    let (server, resources) = create_test_server();
    let token = issue_access_token(&resources);

    let response = server
        .post("/mcp")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&rpc("resources/list", json!({})))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["id"], 1);
}

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let (server, resources) = create_test_server();
    let token = issue_access_token(&resources);

    let response = server
        .post("/mcp")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .add_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )
        .text("{\"jsonrpc\": \"2.0\", ")
        .await;

    response.assert_status_bad_request();
    assert!(response.headers().contains_key(SESSION_HEADER));
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}
