//! One-time authorization codes.

use crate::error::OAuthError;
use crate::oauth2::pkce::{self, random_urlsafe};
use dashmap::DashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Issuance context bound to a code.
#[derive(Debug, Clone)]
pub struct CodeGrant {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub user_id: String,
    pub expires_at: OffsetDateTime,
    pub used: bool,
}

impl AuthorizationCode {
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// Checks run inside the atomic section of [`CodeStore::redeem`]. An `Err`
/// leaves the code unused.
pub type RedeemCheck<'a> = &'a dyn Fn(&AuthorizationCode) -> Result<(), OAuthError>;

pub trait CodeStore: Send + Sync {
    fn insert(&self, record: AuthorizationCode);

    /// Atomically validates and marks the code used.
    ///
    /// Fails with `invalid_grant` when the code is unknown, used or expired,
    /// or with whatever `check` returns. Only a fully successful redemption
    /// flips `used`.
    fn redeem(&self, code: &str, check: RedeemCheck<'_>) -> Result<AuthorizationCode, OAuthError>;

    /// Drops expired records, returning how many were removed.
    fn purge_expired(&self, now: OffsetDateTime) -> usize;

    fn len(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryCodeStore {
    codes: DashMap<String, AuthorizationCode>,
}

impl CodeStore for InMemoryCodeStore {
    fn insert(&self, record: AuthorizationCode) {
        self.codes.insert(record.code.clone(), record);
    }

    fn redeem(&self, code: &str, check: RedeemCheck<'_>) -> Result<AuthorizationCode, OAuthError> {
        // get_mut holds the shard write lock for the whole check-and-set.
        let mut record = self
            .codes
            .get_mut(code)
            .ok_or_else(|| OAuthError::InvalidGrant("Authorization code not found".into()))?;

        if record.used {
            return Err(OAuthError::InvalidGrant(
                "Authorization code already used".into(),
            ));
        }
        if record.value().is_expired() {
            return Err(OAuthError::InvalidGrant("Authorization code expired".into()));
        }
        check(record.value())?;

        record.used = true;
        Ok(record.value().clone())
    }

    fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let before = self.codes.len();
        self.codes.retain(|_, record| record.expires_at > now);
        before.saturating_sub(self.codes.len())
    }

    fn len(&self) -> usize {
        self.codes.len()
    }
}

/// Issues and redeems authorization codes.
#[derive(Clone)]
pub struct AuthorizationCodes {
    store: Arc<dyn CodeStore>,
    lifetime: Duration,
}

impl AuthorizationCodes {
    pub fn new(store: Arc<dyn CodeStore>, lifetime: Duration) -> Self {
        Self { store, lifetime }
    }

    pub fn in_memory(lifetime: Duration) -> Self {
        Self::new(Arc::new(InMemoryCodeStore::default()), lifetime)
    }

    pub fn store(&self) -> &Arc<dyn CodeStore> {
        &self.store
    }

    pub fn issue(&self, grant: CodeGrant) -> String {
        let code = format!("code_{}", random_urlsafe(32));
        self.store.insert(AuthorizationCode {
            code: code.clone(),
            client_id: grant.client_id,
            redirect_uri: grant.redirect_uri,
            scope: grant.scope,
            code_challenge: grant.code_challenge,
            user_id: grant.user_id,
            expires_at: OffsetDateTime::now_utc() + self.lifetime,
            used: false,
        });
        code
    }

    /// Redeems a code for `client_id`, verifying the redirect URI (when given)
    /// and the PKCE verifier before the code is consumed.
    pub fn redeem(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: Option<&str>,
        code_verifier: &str,
    ) -> Result<AuthorizationCode, OAuthError> {
        let result = self.store.redeem(code, &|record| {
            if record.client_id != client_id {
                return Err(OAuthError::InvalidGrant(
                    "Authorization code was issued to another client".into(),
                ));
            }
            if let Some(uri) = redirect_uri
                && uri != record.redirect_uri
            {
                return Err(OAuthError::InvalidGrant("Redirect URI mismatch".into()));
            }
            if !pkce::verify_s256(code_verifier, &record.code_challenge) {
                return Err(OAuthError::InvalidGrant("PKCE verification failed".into()));
            }
            Ok(())
        });

        if let Err(ref e) = result {
            tracing::warn!(client_id, reason = ?e.description(), "authorization code rejected");
        }
        result
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(OffsetDateTime::now_utc())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::pkce::generate;
    use std::sync::Barrier;

    fn grant(challenge: &str) -> CodeGrant {
        CodeGrant {
            client_id: "client-a".into(),
            redirect_uri: "https://client.example/cb".into(),
            scope: "mcp:tools".into(),
            code_challenge: challenge.into(),
            user_id: "user_client-a".into(),
        }
    }

    #[test]
    fn code_redeems_once() {
        let codes = AuthorizationCodes::in_memory(Duration::minutes(10));
        let pair = generate();
        let code = codes.issue(grant(&pair.code_challenge));

        let record = codes
            .redeem(&code, "client-a", None, &pair.code_verifier)
            .unwrap();
        assert_eq!(record.scope, "mcp:tools");
        assert!(record.used);

        let second = codes.redeem(&code, "client-a", None, &pair.code_verifier);
        assert!(matches!(second, Err(OAuthError::InvalidGrant(_))));
    }

    #[test]
    fn failed_redemption_does_not_consume_code() {
        let codes = AuthorizationCodes::in_memory(Duration::minutes(10));
        let pair = generate();
        let code = codes.issue(grant(&pair.code_challenge));

        let wrong_verifier = generate().code_verifier;
        assert!(matches!(
            codes.redeem(&code, "client-a", None, &wrong_verifier),
            Err(OAuthError::InvalidGrant(_))
        ));
        assert!(matches!(
            codes.redeem(&code, "client-b", None, &pair.code_verifier),
            Err(OAuthError::InvalidGrant(_))
        ));
        assert!(matches!(
            codes.redeem(
                &code,
                "client-a",
                Some("https://evil.example/cb"),
                &pair.code_verifier
            ),
            Err(OAuthError::InvalidGrant(_))
        ));

        assert!(
            codes
                .redeem(
                    &code,
                    "client-a",
                    Some("https://client.example/cb"),
                    &pair.code_verifier
                )
                .is_ok()
        );
    }

    #[test]
    fn expired_code_is_rejected_and_purged() {
        let store = Arc::new(InMemoryCodeStore::default());
        let codes = AuthorizationCodes::new(store.clone(), Duration::minutes(10));
        let pair = generate();
        store.insert(AuthorizationCode {
            code: "code_old".into(),
            client_id: "client-a".into(),
            redirect_uri: "https://client.example/cb".into(),
            scope: "mcp:tools".into(),
            code_challenge: pair.code_challenge.clone(),
            user_id: "u".into(),
            expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
            used: false,
        });

        assert!(matches!(
            codes.redeem("code_old", "client-a", None, &pair.code_verifier),
            Err(OAuthError::InvalidGrant(_))
        ));
        assert_eq!(codes.purge_expired(), 1);
        assert!(codes.is_empty());
    }

    #[test]
    fn concurrent_redemption_has_single_winner() {
        let codes = AuthorizationCodes::in_memory(Duration::minutes(10));
        let pair = generate();

        for _ in 0..50 {
            let code = codes.issue(grant(&pair.code_challenge));
            let barrier = Barrier::new(2);
            let results: Vec<bool> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            codes
                                .redeem(&code, "client-a", None, &pair.code_verifier)
                                .is_ok()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        }
    }
}
