use config::{Config, Environment, File, FileFormat};
use music_mcp_server::config::{AppConfig, ConfigError, CredentialConfig};
use std::collections::HashMap;

fn from_yaml(yaml_content: &str) -> AppConfig {
    Config::builder()
        .add_source(File::from_str(yaml_content, FileFormat::Yaml))
        .build()
        .expect("Failed to build config")
        .try_deserialize()
        .expect("Failed to deserialize app config")
}

#[test]
fn test_app_config_deserialization() {
    let app_config = from_yaml(
        r#"
public_url: "https://music.example.com"
bind_addr: "127.0.0.1:9000"
realm: "my-music"
oauth2:
  access_token_lifetime: 900
  authorization_code_lifetime: 120
upstream:
  client_id: "upstream-id"
  client_secret: "upstream-secret"
music_api:
  base_url: "http://localhost:9999/v3"
sessions:
  pending_lifetime: 300
"#,
    );

    assert_eq!(app_config.public_url, "https://music.example.com");
    assert_eq!(app_config.bind_addr, "127.0.0.1:9000");
    assert_eq!(app_config.realm, "my-music");
    assert_eq!(app_config.oauth2.access_token_lifetime, 900);
    assert_eq!(app_config.oauth2.authorization_code_lifetime, 120);
    assert_eq!(app_config.oauth2.default_scope, "mcp:tools");
    assert!(app_config.upstream.is_configured());
    assert_eq!(
        app_config.upstream.token_endpoint,
        "https://oauth2.googleapis.com/token"
    );
    assert_eq!(app_config.music_api.base_url, "http://localhost:9999/v3");
    assert_eq!(app_config.sessions.pending_lifetime, 300);
    assert_eq!(app_config.sessions.sweep_interval_secs, 60);
    assert_eq!(app_config.sessions.idle_timeout_secs, 86_400);
    assert!(matches!(app_config.credentials, CredentialConfig::OauthSession));
    assert!(app_config.validate().is_ok());
}

#[test]
fn test_empty_config_uses_defaults() {
    let app_config = from_yaml("{}");

    assert_eq!(app_config.public_url, "http://localhost:8081");
    assert_eq!(app_config.bind_addr, "0.0.0.0:8081");
    assert_eq!(app_config.service_name, "youtube-music-mcp");
    assert_eq!(
        app_config.oauth2.scopes_supported,
        vec!["mcp:tools", "youtube:readonly", "youtube:manage_playlists"]
    );
    assert!(!app_config.upstream.is_configured());
    assert!(app_config.validate().is_ok());
}

#[test]
fn test_cookie_credentials_mode() {
    let app_config = from_yaml(
        r#"
credentials:
  mode: cookie
  cookie: "SID=abc; HSID=def"
"#,
    );

    match app_config.credentials {
        CredentialConfig::Cookie { cookie } => assert_eq!(cookie, "SID=abc; HSID=def"),
        other => panic!("unexpected credentials {other:?}"),
    }
}

#[test]
fn test_headers_credentials_mode() {
    let app_config = from_yaml(
        r#"
credentials:
  mode: headers
  headers:
    authorization: "SAPISIDHASH 123_abc"
    x-goog-authuser: "0"
"#,
    );

    match app_config.credentials {
        CredentialConfig::Headers { headers } => {
            assert_eq!(headers.len(), 2);
            assert_eq!(headers["x-goog-authuser"], "0");
        }
        other => panic!("unexpected credentials {other:?}"),
    }
}

#[test]
fn test_static_api_mode_needs_upstream_client() {
    let yaml_content = r#"
credentials:
  mode: static_api
  refresh_token: "operator-rt"
"#;
    let app_config = from_yaml(yaml_content);
    assert!(matches!(
        &app_config.credentials,
        CredentialConfig::StaticApi { refresh_token } if refresh_token == "operator-rt"
    ));
    assert!(matches!(
        app_config.validate(),
        Err(ConfigError::Validation(_))
    ));

    let app_config = from_yaml(&format!(
        "{yaml_content}upstream:\n  client_id: id\n  client_secret: secret\n"
    ));
    assert!(app_config.validate().is_ok());
}

#[test]
fn test_unknown_credentials_mode_is_rejected() {
    let result = Config::builder()
        .add_source(File::from_str(
            "credentials:\n  mode: telepathy\n",
            FileFormat::Yaml,
        ))
        .build()
        .expect("Failed to build config")
        .try_deserialize::<AppConfig>();

    assert!(result.is_err());
}

#[test]
fn test_environment_overrides_file() {
    let mut env = HashMap::new();
    env.insert("APP_UPSTREAM__CLIENT_ID".to_string(), "env-id".to_string());
    env.insert("APP_PUBLIC_URL".to_string(), "https://env.example.com".to_string());

    let app_config: AppConfig = Config::builder()
        .add_source(File::from_str(
            "public_url: \"https://file.example.com\"\nupstream:\n  client_id: file-id\n",
            FileFormat::Yaml,
        ))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .source(Some(env)),
        )
        .build()
        .expect("Failed to build config")
        .try_deserialize()
        .expect("Failed to deserialize app config");

    assert_eq!(app_config.public_url, "https://env.example.com");
    assert_eq!(app_config.upstream.client_id, "env-id");
}

#[test]
fn test_validation_failures() {
    let mut app_config = from_yaml("oauth2:\n  access_token_lifetime: 0\n");
    assert!(app_config.validate().is_err());

    app_config = from_yaml("public_url: \"::nope::\"\n");
    assert!(app_config.validate().is_err());

    app_config = from_yaml(
        "oauth2:\n  scopes_supported: [\"mcp:tools\"]\n  default_scope: \"youtube:readonly\"\n",
    );
    let err = app_config.validate().unwrap_err();
    assert!(err.to_string().contains("youtube:readonly"));

    app_config = from_yaml("sessions:\n  pending_lifetime: -5\n");
    assert!(app_config.validate().is_err());

    app_config = from_yaml("sessions:\n  idle_timeout_secs: 0\n");
    let err = app_config.validate().unwrap_err();
    assert!(err.to_string().contains("idle_timeout_secs"));
}
