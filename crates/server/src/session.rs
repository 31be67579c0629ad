//! Client-facing sessions and lazy upstream credential refresh.
//!
//! Each session lives behind its own async mutex. `validate_and_refresh`
//! holds that lock across the upstream refresh call, so concurrent callers on
//! the same session see exactly one refresh and then reuse its result.
//!
//! A session is claimed by the first authenticated client that uses it and is
//! never handed to another client afterwards.

use crate::error::{OAuthError, SessionError};
use crate::oauth2::upstream::UpstreamCredential;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

/// Credentials expiring within this window are refreshed before use.
pub const REFRESH_SKEW: Duration = Duration::seconds(30);

/// How long an AUTHENTICATED session without a refresh token outlives its credential.
pub const EXPIRY_GRACE: Duration = Duration::minutes(5);

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::hours(24);

/// Produces a fresh upstream credential from a refresh token.
pub trait CredentialRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<UpstreamCredential, OAuthError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Pending,
    Authenticated,
    Expired,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub state: SessionState,
    pub credential: Option<UpstreamCredential>,
    /// PENDING and EXPIRED: link deadline. AUTHENTICATED: credential expiry.
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub last_used_at: OffsetDateTime,
    /// OAuth client that claimed the session.
    pub owner: Option<String>,
    /// Where the caller links their upstream account.
    pub authorization_url: String,
    pub client_info: Option<Value>,
}

impl Session {
    /// Anonymous callers and the owning client may use the session.
    pub fn is_accessible_by(&self, client_id: Option<&str>) -> bool {
        match (self.owner.as_deref(), client_id) {
            (Some(owner), Some(client_id)) => owner == client_id,
            _ => true,
        }
    }

    /// Whether the sweep may drop this session.
    fn is_stale(&self, now: OffsetDateTime, idle_timeout: Duration) -> bool {
        match self.state {
            SessionState::Pending | SessionState::Expired => now >= self.expires_at,
            SessionState::Authenticated => {
                let refreshable = self
                    .credential
                    .as_ref()
                    .is_some_and(|c| c.refresh_token.is_some());
                now - self.last_used_at >= idle_timeout
                    || (!refreshable && now >= self.expires_at + EXPIRY_GRACE)
            }
        }
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    refresher: Arc<dyn CredentialRefresher>,
    /// Upstream link endpoint; the session id is appended as a query parameter.
    authorize_url: String,
    pending_lifetime: Duration,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        refresher: Arc<dyn CredentialRefresher>,
        authorize_url: impl Into<String>,
        pending_lifetime: Duration,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            refresher,
            authorize_url: authorize_url.into(),
            pending_lifetime,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// How long an AUTHENTICATED session may go unused before the sweep drops it.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Creates an unclaimed PENDING session with a fresh id.
    pub fn create_session(&self) -> Session {
        self.create_owned(None)
    }

    fn create_owned(&self, owner: Option<&str>) -> Session {
        let now = OffsetDateTime::now_utc();
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let session = Session {
            authorization_url: format!(
                "{}?session_id={}",
                self.authorize_url,
                urlencoding::encode(&session_id)
            ),
            session_id: session_id.clone(),
            state: SessionState::Pending,
            credential: None,
            expires_at: now + self.pending_lifetime,
            created_at: now,
            last_used_at: now,
            owner: owner.map(String::from),
            client_info: None,
        };
        self.sessions
            .insert(session_id.clone(), Arc::new(Mutex::new(session.clone())));
        tracing::debug!(%session_id, owner = ?owner, "created session");
        session
    }

    /// Returns the named session for `client_id`, claiming it if it is
    /// unclaimed. An absent or unknown id, or one claimed by another client,
    /// gets a new session instead.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        client_id: Option<&str>,
    ) -> Session {
        if let Some(id) = session_id
            && let Some(entry) = self.entry(id)
        {
            let mut session = entry.lock().await;
            if session.is_accessible_by(client_id) {
                if session.owner.is_none()
                    && let Some(client_id) = client_id
                {
                    session.owner = Some(client_id.to_string());
                    tracing::debug!(session_id = id, client_id, "session claimed");
                }
                session.last_used_at = OffsetDateTime::now_utc();
                return session.clone();
            }
            tracing::warn!(
                session_id = id,
                client_id,
                "session belongs to another client, issuing a new one"
            );
        }
        self.create_owned(client_id)
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        let entry = self.entry(session_id)?;
        let session = entry.lock().await;
        Some(session.clone())
    }

    /// Binds an upstream credential and moves the session to AUTHENTICATED.
    pub async fn bind_credential(
        &self,
        session_id: &str,
        credential: UpstreamCredential,
    ) -> Result<Session, SessionError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        let mut session = entry.lock().await;
        session.expires_at = credential.expires_at;
        session.credential = Some(credential);
        session.state = SessionState::Authenticated;
        tracing::info!(session_id, "session authenticated");
        Ok(session.clone())
    }

    pub async fn record_client_info(&self, session_id: &str, client_info: Value) {
        if let Some(entry) = self.entry(session_id) {
            entry.lock().await.client_info = Some(client_info);
        }
    }

    /// Returns a usable upstream credential, refreshing it first if it expired.
    ///
    /// At most one refresh runs per session at a time. A refresh rejected by
    /// the provider moves the session to EXPIRED; a transient failure keeps
    /// the prior credential so a later call can retry.
    pub async fn validate_and_refresh(
        &self,
        session_id: &str,
    ) -> Result<(Session, UpstreamCredential), SessionError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        let mut session = entry.lock().await;
        session.last_used_at = OffsetDateTime::now_utc();

        match session.state {
            SessionState::Authenticated => {}
            SessionState::Pending => {
                return Err(SessionError::NotAuthenticated(session_id.to_string()));
            }
            SessionState::Expired => {
                return Err(SessionError::TokenExpired(session_id.to_string()));
            }
        }

        let Some(credential) = session.credential.clone() else {
            session.state = SessionState::Pending;
            return Err(SessionError::NotAuthenticated(session_id.to_string()));
        };

        if !credential.expires_within(REFRESH_SKEW) {
            return Ok((session.clone(), credential));
        }

        let fresh = self.refresh_locked(&mut session, session_id, &credential).await?;
        Ok((session.clone(), fresh))
    }

    /// Refreshes a credential the music API turned away before its expiry.
    ///
    /// When another caller already replaced `rejected_access_token`, the
    /// current credential is returned without a second refresh.
    pub async fn refresh_rejected(
        &self,
        session_id: &str,
        rejected_access_token: &str,
    ) -> Result<UpstreamCredential, SessionError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        let mut session = entry.lock().await;

        let credential = match (&session.state, session.credential.clone()) {
            (SessionState::Authenticated, Some(credential)) => credential,
            (SessionState::Expired, _) => {
                return Err(SessionError::TokenExpired(session_id.to_string()));
            }
            _ => return Err(SessionError::NotAuthenticated(session_id.to_string())),
        };
        if credential.access_token != rejected_access_token {
            return Ok(credential);
        }
        tracing::info!(session_id, "music API rejected credential, forcing refresh");
        self.refresh_locked(&mut session, session_id, &credential)
            .await
    }

    /// Moves the session to EXPIRED so the caller has to link again.
    pub async fn expire(&self, session_id: &str) {
        if let Some(entry) = self.entry(session_id) {
            let mut session = entry.lock().await;
            self.mark_expired(&mut session);
            tracing::info!(session_id, "session expired, upstream account must be linked again");
        }
    }

    async fn refresh_locked(
        &self,
        session: &mut Session,
        session_id: &str,
        credential: &UpstreamCredential,
    ) -> Result<UpstreamCredential, SessionError> {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            self.mark_expired(session);
            tracing::info!(session_id, "session expired without refresh token");
            return Err(SessionError::TokenExpired(session_id.to_string()));
        };

        match self.refresher.refresh(&refresh_token).await {
            Ok(mut fresh) => {
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = Some(refresh_token);
                }
                session.expires_at = fresh.expires_at;
                session.credential = Some(fresh.clone());
                tracing::info!(session_id, "refreshed upstream credential");
                Ok(fresh)
            }
            Err(err) => {
                if matches!(err, OAuthError::InvalidGrant(_)) {
                    self.mark_expired(session);
                    tracing::warn!(
                        session_id,
                        error = %err,
                        "upstream refresh rejected, session expired"
                    );
                } else {
                    tracing::warn!(
                        session_id,
                        error = %err,
                        "upstream refresh failed, keeping prior credential"
                    );
                }
                Err(SessionError::RefreshFailed(err))
            }
        }
    }

    /// EXPIRED sessions keep their id for one pending lifetime so the caller
    /// can relink through the same authorization URL.
    fn mark_expired(&self, session: &mut Session) {
        session.state = SessionState::Expired;
        session.expires_at = OffsetDateTime::now_utc() + self.pending_lifetime;
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drops PENDING and EXPIRED sessions past their link deadline, and
    /// AUTHENTICATED ones that went idle or outlived a non-refreshable
    /// credential. Sessions locked by an in-flight call are left alone.
    pub fn sweep_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| match entry.try_lock() {
            Ok(session) => !session.is_stale(now, self.idle_timeout),
            Err(_) => true,
        });
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn entry(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        // Clone the Arc so no map guard is held across an await.
        self.sessions.get(session_id).map(|e| e.value().clone())
    }
}
