//! Opaque access tokens and their refresh grants.

use crate::error::OAuthError;
use crate::oauth2::pkce::random_urlsafe;
use dashmap::DashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub refresh_token: Option<String>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }

    /// Remaining lifetime in whole seconds, never negative.
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - OffsetDateTime::now_utc())
            .whole_seconds()
            .max(0)
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }
}

/// What a refresh token entitles its holder to.
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    pub refresh_token: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub created_at: OffsetDateTime,
}

pub trait TokenStore: Send + Sync {
    fn insert_access(&self, token: AccessToken);
    fn get_access(&self, token: &str) -> Option<AccessToken>;
    fn insert_refresh(&self, grant: RefreshGrant);
    fn get_refresh(&self, refresh_token: &str) -> Option<RefreshGrant>;
    /// Drops expired access tokens. Refresh grants do not expire.
    fn purge_expired(&self, now: OffsetDateTime) -> usize;
    fn access_len(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    access: DashMap<String, AccessToken>,
    refresh: DashMap<String, RefreshGrant>,
}

impl TokenStore for InMemoryTokenStore {
    fn insert_access(&self, token: AccessToken) {
        self.access.insert(token.token.clone(), token);
    }

    fn get_access(&self, token: &str) -> Option<AccessToken> {
        self.access.get(token).map(|t| t.value().clone())
    }

    fn insert_refresh(&self, grant: RefreshGrant) {
        self.refresh.insert(grant.refresh_token.clone(), grant);
    }

    fn get_refresh(&self, refresh_token: &str) -> Option<RefreshGrant> {
        self.refresh.get(refresh_token).map(|g| g.value().clone())
    }

    fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let before = self.access.len();
        self.access.retain(|_, token| token.expires_at > now);
        before.saturating_sub(self.access.len())
    }

    fn access_len(&self) -> usize {
        self.access.len()
    }
}

#[derive(Clone)]
pub struct Tokens {
    store: Arc<dyn TokenStore>,
    access_token_lifetime: Duration,
}

impl Tokens {
    pub fn new(store: Arc<dyn TokenStore>, access_token_lifetime: Duration) -> Self {
        Self {
            store,
            access_token_lifetime,
        }
    }

    pub fn in_memory(access_token_lifetime: Duration) -> Self {
        Self::new(
            Arc::new(InMemoryTokenStore::default()),
            access_token_lifetime,
        )
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn access_token_lifetime(&self) -> Duration {
        self.access_token_lifetime
    }

    /// Issues an access token plus a refresh token bound to the same grant.
    pub fn issue(
        &self,
        client_id: &str,
        user_id: &str,
        scope: &str,
        ttl: Option<Duration>,
    ) -> AccessToken {
        let now = OffsetDateTime::now_utc();
        let refresh_token = format!("refresh_{}", random_urlsafe(32));
        self.store.insert_refresh(RefreshGrant {
            refresh_token: refresh_token.clone(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            created_at: now,
        });

        let token = AccessToken {
            token: format!("mcp_{}", random_urlsafe(32)),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            issued_at: now,
            expires_at: now + ttl.unwrap_or(self.access_token_lifetime),
            refresh_token: Some(refresh_token),
        };
        self.store.insert_access(token.clone());
        tracing::info!(client_id, user_id, scope, "issued access token");
        token
    }

    /// Returns the record for a live token; unknown and expired tokens yield `None`.
    pub fn validate(&self, token: &str) -> Option<AccessToken> {
        self.store.get_access(token).filter(|t| !t.is_expired())
    }

    /// Issues a new access token for an existing refresh grant.
    ///
    /// The refresh token is not rotated and earlier access tokens stay valid
    /// until their own expiry. When `client_id` is given it must own the grant.
    pub fn refresh(
        &self,
        refresh_token: &str,
        client_id: Option<&str>,
    ) -> Result<AccessToken, OAuthError> {
        let grant = self
            .store
            .get_refresh(refresh_token)
            .ok_or_else(|| OAuthError::InvalidGrant("Refresh token not found".into()))?;

        if let Some(client_id) = client_id
            && client_id != grant.client_id
        {
            return Err(OAuthError::InvalidGrant(
                "Refresh token does not belong to this client".into(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let token = AccessToken {
            token: format!("mcp_{}", random_urlsafe(32)),
            client_id: grant.client_id.clone(),
            user_id: grant.user_id.clone(),
            scope: grant.scope.clone(),
            issued_at: now,
            expires_at: now + self.access_token_lifetime,
            refresh_token: Some(grant.refresh_token),
        };
        self.store.insert_access(token.clone());
        tracing::info!(client_id = %token.client_id, "refreshed access token");
        Ok(token)
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(OffsetDateTime::now_utc())
    }
}
