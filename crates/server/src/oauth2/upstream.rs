//! Pass-through OAuth client for the third-party identity provider.
//!
//! Mirrors the local code exchange and refresh, but every step is a
//! form-encoded POST to the provider's token endpoint. In-flight
//! authorizations are keyed by their random `state` value.

use crate::config::UpstreamConfig;
use crate::error::{OAuthError, UpstreamError};
use crate::oauth2::pkce::{self, S256, random_urlsafe};
use crate::session::CredentialRefresher;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

/// Fallback when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// The real account credential issued by the provider.
#[derive(Debug, Clone)]
pub struct UpstreamCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_at: OffsetDateTime,
}

impl UpstreamCredential {
    /// True once `expires_at - skew` has passed.
    pub fn expires_within(&self, skew: Duration) -> bool {
        OffsetDateTime::now_utc() + skew >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }

    pub fn expires_in(&self) -> i64 {
        (self.expires_at - OffsetDateTime::now_utc())
            .whole_seconds()
            .max(0)
    }
}

#[derive(Debug, Deserialize)]
struct ProviderTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
}

impl ProviderTokenResponse {
    fn into_credential(self, previous_refresh: Option<&str>) -> UpstreamCredential {
        UpstreamCredential {
            access_token: self.access_token,
            // Providers commonly omit the refresh token on refresh.
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(String::from)),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: self.scope,
            expires_at: OffsetDateTime::now_utc()
                + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN)),
        }
    }
}

/// An upstream authorization in flight.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub redirect_uri: String,
    pub session_id: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizationStart {
    pub auth_url: String,
    pub state: String,
    pub expires_in: i64,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
    pending: DashMap<String, PendingAuthorization>,
    pending_lifetime: Duration,
}

impl UpstreamClient {
    pub fn new(
        config: &UpstreamConfig,
        pending_lifetime: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
            pending: DashMap::new(),
            pending_lifetime,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Mints state and a PKCE pair and returns the provider authorization URL.
    pub fn begin_authorization(
        &self,
        redirect_uri: &str,
        session_id: Option<String>,
    ) -> Result<AuthorizationStart, UpstreamError> {
        if !self.is_configured() {
            return Err(UpstreamError::NotConfigured);
        }

        let state = random_urlsafe(32);
        let pair = pkce::generate();

        let mut auth_url = url::Url::parse(&self.config.authorization_endpoint)
            .map_err(|e| UpstreamError::InvalidResponse(format!("authorization endpoint: {e}")))?;
        auth_url
            .query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &state)
            .append_pair("code_challenge", &pair.code_challenge)
            .append_pair("code_challenge_method", S256)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                state: state.clone(),
                code_verifier: pair.code_verifier,
                code_challenge: pair.code_challenge,
                redirect_uri: redirect_uri.to_string(),
                session_id: session_id.clone(),
                created_at: OffsetDateTime::now_utc(),
            },
        );
        tracing::info!(session_id = ?session_id, "started upstream authorization");

        Ok(AuthorizationStart {
            auth_url: auth_url.into(),
            state,
            expires_in: self.pending_lifetime.whole_seconds(),
        })
    }

    /// Exchanges a provider code for a credential.
    ///
    /// The pending entry is consumed up front so a state value can never be
    /// exchanged twice. It is put back when the provider could not be reached,
    /// so the browser can retry the callback.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
    ) -> Result<(PendingAuthorization, UpstreamCredential), UpstreamError> {
        let (_, pending) = self
            .pending
            .remove(state)
            .ok_or(UpstreamError::UnknownState)?;
        if OffsetDateTime::now_utc() - pending.created_at > self.pending_lifetime {
            return Err(UpstreamError::UnknownState);
        }

        let response = match self
            .post_token_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", pending.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code_verifier", pending.code_verifier.as_str()),
            ])
            .await
        {
            Ok(response) => response,
            Err(err @ (UpstreamError::Timeout | UpstreamError::Transport(_))) => {
                self.pending.insert(state.to_string(), pending);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        tracing::info!(session_id = ?pending.session_id, "upstream code exchange succeeded");
        Ok((pending, response.into_credential(None)))
    }

    /// Uses a provider refresh token to obtain a new access credential.
    pub async fn refresh(&self, refresh_token: &str) -> Result<UpstreamCredential, UpstreamError> {
        if !self.is_configured() {
            return Err(UpstreamError::NotConfigured);
        }
        let response = self
            .post_token_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .await?;
        tracing::info!("upstream token refresh succeeded");
        Ok(response.into_credential(Some(refresh_token)))
    }

    /// Removes in-flight authorizations older than the pending lifetime.
    pub fn sweep_pending(&self) -> usize {
        let cutoff = OffsetDateTime::now_utc() - self.pending_lifetime;
        let before = self.pending.len();
        self.pending.retain(|_, p| p.created_at > cutoff);
        before.saturating_sub(self.pending.len())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    async fn post_token_form(
        &self,
        form: &[(&str, &str)],
    ) -> Result<ProviderTokenResponse, UpstreamError> {
        let response = self
            .http
            .post(self.config.token_endpoint.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "upstream token request failed");
                UpstreamError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            // The body may echo secrets; only the status is kept.
            tracing::error!(status = status.as_u16(), "upstream token endpoint rejected request");
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
            });
        }

        response.json::<ProviderTokenResponse>().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse upstream token response");
            UpstreamError::InvalidResponse(e.to_string())
        })
    }
}

impl CredentialRefresher for UpstreamClient {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<UpstreamCredential, OAuthError>> {
        Box::pin(async move {
            UpstreamClient::refresh(self, refresh_token)
                .await
                .map_err(OAuthError::from)
        })
    }
}
