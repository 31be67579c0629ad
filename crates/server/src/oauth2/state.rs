//! OAuth2 state management.
//!
//! Bundles the stores and the advertised server parameters shared by the
//! OAuth2 endpoints and the request gate.

use crate::config::AppConfig;
use crate::oauth2::{
    clients::ClientRegistry, codes::AuthorizationCodes, tokens::Tokens,
};
use time::Duration;

/// OAuth2 state containing all components needed for the authorization server.
#[derive(Clone)]
pub struct OAuth2State {
    pub clients: ClientRegistry,
    pub codes: AuthorizationCodes,
    pub tokens: Tokens,
    /// Base URL of this server, also used as issuer and resource identifier
    pub issuer_url: String,
    /// Realm advertised in bearer challenges
    pub realm: String,
    pub scopes_supported: Vec<String>,
    pub default_scope: String,
}

impl OAuth2State {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            clients: ClientRegistry::in_memory(config.oauth2.default_scope.clone()),
            codes: AuthorizationCodes::in_memory(Duration::seconds(
                config.oauth2.authorization_code_lifetime,
            )),
            tokens: Tokens::in_memory(Duration::seconds(config.oauth2.access_token_lifetime)),
            issuer_url: config.base_url().to_string(),
            realm: config.realm.clone(),
            scopes_supported: config.oauth2.scopes_supported.clone(),
            default_scope: config.oauth2.default_scope.clone(),
        }
    }

    /// Access token lifetime in seconds
    pub fn access_token_lifetime(&self) -> i64 {
        self.tokens.access_token_lifetime().whole_seconds()
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.issuer_url, path.trim_start_matches('/'))
    }

    pub fn resource_metadata_url(&self) -> String {
        self.endpoint("/.well-known/oauth-protected-resource")
    }

    /// Reduces a requested scope string to the supported scopes.
    ///
    /// `None` or an empty request yields the default scope; a request naming
    /// only unsupported scopes yields `None`.
    pub fn negotiate_scope(&self, requested: Option<&str>) -> Option<String> {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());
        let Some(requested) = requested else {
            return Some(self.default_scope.clone());
        };
        let granted: Vec<&str> = requested
            .split_whitespace()
            .filter(|s| self.scopes_supported.iter().any(|allowed| allowed == s))
            .collect();
        if granted.is_empty() {
            None
        } else {
            Some(granted.join(" "))
        }
    }

    /// Evicts expired codes and access tokens. Returns `(codes, tokens)` removed.
    pub fn purge_expired(&self) -> (usize, usize) {
        (self.codes.purge_expired(), self.tokens.purge_expired())
    }
}
