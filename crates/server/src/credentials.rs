//! Strategies for obtaining the upstream credential a tool call runs with.

use crate::config::CredentialConfig;
use crate::error::SessionError;
use crate::oauth2::upstream::UpstreamCredential;
use crate::session::{CredentialRefresher, REFRESH_SKEW, SessionManager};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A resolved credential, ready to attach to a music API request.
#[derive(Debug, Clone)]
pub enum Credential {
    Bearer(String),
    Cookie(String),
    Headers(Vec<(String, String)>),
}

impl Credential {
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credential::Bearer(token) => request.bearer_auth(token),
            Credential::Cookie(cookie) => request.header(reqwest::header::COOKIE, cookie),
            Credential::Headers(headers) => headers
                .iter()
                .fold(request, |req, (name, value)| req.header(name, value)),
        }
    }
}

/// Operator-owned refresh token with a cached access credential.
pub struct StaticApiCredential {
    refresh_token: String,
    refresher: Arc<dyn CredentialRefresher>,
    cached: Mutex<Option<UpstreamCredential>>,
}

impl StaticApiCredential {
    pub fn new(refresh_token: impl Into<String>, refresher: Arc<dyn CredentialRefresher>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            refresher,
            cached: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, SessionError> {
        self.access_token_replacing(None).await
    }

    /// Like `access_token`, but never hands back `rejected` from the cache.
    async fn access_token_replacing(&self, rejected: Option<&str>) -> Result<String, SessionError> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref()
            && !credential.expires_within(REFRESH_SKEW)
            && rejected != Some(credential.access_token.as_str())
        {
            return Ok(credential.access_token.clone());
        }

        let fresh = self
            .refresher
            .refresh(&self.refresh_token)
            .await
            .map_err(SessionError::RefreshFailed)?;
        let token = fresh.access_token.clone();
        *cached = Some(fresh);
        tracing::debug!("refreshed static API credential");
        Ok(token)
    }
}

pub enum CredentialProvider {
    OAuthSession(Arc<SessionManager>),
    Cookie(String),
    Headers(Vec<(String, String)>),
    StaticApi(StaticApiCredential),
}

impl CredentialProvider {
    pub fn from_config(
        config: &CredentialConfig,
        sessions: Arc<SessionManager>,
        refresher: Arc<dyn CredentialRefresher>,
    ) -> Self {
        match config {
            CredentialConfig::OauthSession => CredentialProvider::OAuthSession(sessions),
            CredentialConfig::Cookie { cookie } => CredentialProvider::Cookie(cookie.clone()),
            CredentialConfig::Headers { headers } => {
                let mut headers: Vec<_> = headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                headers.sort();
                CredentialProvider::Headers(headers)
            }
            CredentialConfig::StaticApi { refresh_token } => {
                CredentialProvider::StaticApi(StaticApiCredential::new(
                    refresh_token.clone(),
                    refresher,
                ))
            }
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            CredentialProvider::OAuthSession(_) => "oauth_session",
            CredentialProvider::Cookie(_) => "cookie",
            CredentialProvider::Headers(_) => "headers",
            CredentialProvider::StaticApi(_) => "static_api",
        }
    }

    /// Resolves the credential for a call made on `session_id`.
    ///
    /// Only the OAuth session strategy looks at the session.
    pub async fn resolve(&self, session_id: &str) -> Result<Credential, SessionError> {
        match self {
            CredentialProvider::OAuthSession(sessions) => {
                let (_, credential) = sessions.validate_and_refresh(session_id).await?;
                Ok(Credential::Bearer(credential.access_token))
            }
            CredentialProvider::Cookie(cookie) => Ok(Credential::Cookie(cookie.clone())),
            CredentialProvider::Headers(headers) => Ok(Credential::Headers(headers.clone())),
            CredentialProvider::StaticApi(inner) => {
                Ok(Credential::Bearer(inner.access_token().await?))
            }
        }
    }

    /// Replaces a credential the music API rejected.
    ///
    /// Returns `None` for the fixed strategies, which have nothing to refresh.
    pub async fn recover(
        &self,
        session_id: &str,
        rejected: &Credential,
    ) -> Result<Option<Credential>, SessionError> {
        let Credential::Bearer(rejected) = rejected else {
            return Ok(None);
        };
        match self {
            CredentialProvider::OAuthSession(sessions) => {
                let fresh = sessions.refresh_rejected(session_id, rejected).await?;
                Ok(Some(Credential::Bearer(fresh.access_token)))
            }
            CredentialProvider::StaticApi(inner) => Ok(Some(Credential::Bearer(
                inner.access_token_replacing(Some(rejected.as_str())).await?,
            ))),
            CredentialProvider::Cookie(_) | CredentialProvider::Headers(_) => Ok(None),
        }
    }

    /// Gives up on a credential that stays rejected after a refresh.
    pub async fn revoke(&self, session_id: &str) {
        match self {
            CredentialProvider::OAuthSession(sessions) => sessions.expire(session_id).await,
            CredentialProvider::StaticApi(inner) => *inner.cached.lock().await = None,
            CredentialProvider::Cookie(_) | CredentialProvider::Headers(_) => {}
        }
    }
}
