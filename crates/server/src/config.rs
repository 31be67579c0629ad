use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

pub const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";
pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Externally reachable base URL. Used for the issuer, discovery documents
    /// and the `resource_metadata` challenge parameter.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Realm advertised in `WWW-Authenticate` challenges.
    #[serde(default = "default_realm")]
    pub realm: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub oauth2: OAuth2Config,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub music_api: MusicApiConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
            bind_addr: default_bind_addr(),
            realm: default_realm(),
            service_name: default_service_name(),
            oauth2: OAuth2Config::default(),
            upstream: UpstreamConfig::default(),
            music_api: MusicApiConfig::default(),
            sessions: SessionConfig::default(),
            credentials: CredentialConfig::default(),
        }
    }
}

impl AppConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    /// Absolute URL for a path served by this process.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.public_url).map_err(|e| {
            ConfigError::Validation(format!("public_url is not a valid URL: {e}"))
        })?;
        if self.oauth2.access_token_lifetime <= 0 {
            return Err(ConfigError::Validation(
                "oauth2.access_token_lifetime must be > 0".into(),
            ));
        }
        if self.oauth2.authorization_code_lifetime <= 0 {
            return Err(ConfigError::Validation(
                "oauth2.authorization_code_lifetime must be > 0".into(),
            ));
        }
        if self.oauth2.scopes_supported.is_empty() {
            return Err(ConfigError::Validation(
                "oauth2.scopes_supported must not be empty".into(),
            ));
        }
        if !self
            .oauth2
            .scopes_supported
            .contains(&self.oauth2.default_scope)
        {
            return Err(ConfigError::Validation(format!(
                "oauth2.default_scope '{}' is not listed in scopes_supported",
                self.oauth2.default_scope
            )));
        }
        if self.sessions.pending_lifetime <= 0 || self.sessions.idle_timeout_secs <= 0 {
            return Err(ConfigError::Validation(
                "sessions.pending_lifetime and sessions.idle_timeout_secs must be > 0".into(),
            ));
        }
        if self.upstream.timeout_secs == 0 || self.music_api.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "upstream.timeout_secs and music_api.timeout_secs must be > 0".into(),
            ));
        }
        if matches!(self.credentials, CredentialConfig::StaticApi { .. })
            && !self.upstream.is_configured()
        {
            return Err(ConfigError::Validation(
                "credentials.mode static_api requires upstream.client_id and upstream.client_secret"
                    .into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Authorization code lifetime in seconds
    #[serde(default = "default_code_lifetime")]
    pub authorization_code_lifetime: i64,
    #[serde(default = "default_scopes_supported")]
    pub scopes_supported: Vec<String>,
    #[serde(default = "default_scope")]
    pub default_scope: String,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            access_token_lifetime: default_access_token_lifetime(),
            authorization_code_lifetime: default_code_lifetime(),
            scopes_supported: default_scopes_supported(),
            default_scope: default_scope(),
        }
    }
}

/// Third-party identity provider the real account credential comes from.
#[derive(Clone, Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_upstream_authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(default = "default_upstream_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_upstream_scope")]
    pub scope: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorization_endpoint: default_upstream_authorization_endpoint(),
            token_endpoint: default_upstream_token_endpoint(),
            scope: default_upstream_scope(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MusicApiConfig {
    #[serde(default = "default_music_api_base")]
    pub base_url: String,
    #[serde(default = "default_music_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for MusicApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_music_api_base(),
            timeout_secs: default_music_api_timeout(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    /// Seconds a PENDING session (and an upstream authorization in flight) stays valid
    #[serde(default = "default_pending_lifetime")]
    pub pending_lifetime: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Seconds an AUTHENTICATED session may go unused before it is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_lifetime: default_pending_lifetime(),
            sweep_interval_secs: default_sweep_interval(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

/// How tool calls obtain their upstream credential.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CredentialConfig {
    /// Per-session upstream OAuth credential, refreshed lazily.
    #[default]
    OauthSession,
    /// Raw browser cookie string forwarded as the `Cookie` header.
    Cookie { cookie: String },
    /// Fixed set of request headers copied onto every upstream call.
    Headers { headers: HashMap<String, String> },
    /// Long-lived upstream refresh token belonging to the operator.
    StaticApi { refresh_token: String },
}

fn default_public_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_realm() -> String {
    "youtube-music".to_string()
}

fn default_service_name() -> String {
    "youtube-music-mcp".to_string()
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_code_lifetime() -> i64 {
    600
}

fn default_scopes_supported() -> Vec<String> {
    ["mcp:tools", "youtube:readonly", "youtube:manage_playlists"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_scope() -> String {
    "mcp:tools".to_string()
}

fn default_upstream_authorization_endpoint() -> String {
    GOOGLE_AUTHORIZATION_ENDPOINT.to_string()
}

fn default_upstream_token_endpoint() -> String {
    GOOGLE_TOKEN_ENDPOINT.to_string()
}

fn default_upstream_scope() -> String {
    YOUTUBE_SCOPE.to_string()
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_music_api_base() -> String {
    YOUTUBE_API_BASE.to_string()
}

fn default_music_api_timeout() -> u64 {
    15
}

fn default_pending_lifetime() -> i64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_timeout() -> i64 {
    86_400
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `UPSTREAM__CLIENT_ID`) overrides the file value. The file
/// itself is optional.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;

    if matches!(app.credentials, CredentialConfig::OauthSession) && !app.upstream.is_configured()
    {
        tracing::warn!(
            "upstream.client_id / upstream.client_secret not set; upstream account linking will fail"
        );
    }

    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
