//! An MCP tool server for a music service account.
//!
//! MCP clients authenticate against the built-in OAuth 2.0 authorization
//! server (authorization code with PKCE) and then call tools over JSON-RPC.
//! Tool calls run against the music API with an upstream credential bound to
//! the caller's session, refreshed transparently before it expires.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::config::AppConfig;
use crate::credentials::CredentialProvider;
use crate::error::SetupError;
use crate::music::MusicClient;
use crate::oauth2::OAuth2State;
use crate::oauth2::upstream::UpstreamClient;
use crate::session::SessionManager;

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod mcp;
pub mod music;
pub mod oauth2;
pub mod session;

/// Process-wide state shared by every handler.
#[derive(Clone)]
pub struct AppResources {
    pub config: Arc<AppConfig>,
    pub oauth2: OAuth2State,
    pub upstream: Arc<UpstreamClient>,
    pub sessions: Arc<SessionManager>,
    pub credentials: Arc<CredentialProvider>,
    pub music: Arc<MusicClient>,
    pub started_at: OffsetDateTime,
}

impl AppResources {
    pub fn new(config: AppConfig) -> Result<Self, SetupError> {
        let pending_lifetime = Duration::seconds(config.sessions.pending_lifetime);
        let upstream = Arc::new(UpstreamClient::new(&config.upstream, pending_lifetime)?);
        let sessions = Arc::new(
            SessionManager::new(
                upstream.clone(),
                config.endpoint_url("/oauth/upstream/authorize"),
                pending_lifetime,
            )
            .with_idle_timeout(Duration::seconds(config.sessions.idle_timeout_secs)),
        );
        let credentials = Arc::new(CredentialProvider::from_config(
            &config.credentials,
            sessions.clone(),
            upstream.clone(),
        ));
        let music = Arc::new(MusicClient::new(&config.music_api)?);
        tracing::info!(mode = credentials.mode(), "credential provider configured");

        Ok(Self {
            oauth2: OAuth2State::new(&config),
            config: Arc::new(config),
            upstream,
            sessions,
            credentials,
            music,
            started_at: OffsetDateTime::now_utc(),
        })
    }

    /// Evicts everything that has expired. Called periodically by the binary.
    pub fn sweep_expired(&self) {
        let (codes, tokens) = self.oauth2.purge_expired();
        let pending = self.upstream.sweep_pending();
        let sessions = self.sessions.sweep_expired();
        if codes + tokens + pending + sessions > 0 {
            tracing::debug!(codes, tokens, pending, sessions, "swept expired records");
        }
    }
}
