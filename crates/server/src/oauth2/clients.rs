//! Dynamic client registry (RFC 7591).

use crate::error::OAuthError;
use crate::oauth2::pkce::random_urlsafe;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use utoipa::ToSchema;

const DEFAULT_CLIENT_NAME: &str = "Unknown MCP Client";
const MAX_ID_ATTEMPTS: usize = 4;

/// A registered client. Immutable after registration.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: String,
    pub created_at: OffsetDateTime,
}

impl ClientRegistration {
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    /// The redirect URI to use when the request does not name one.
    pub fn default_redirect_uri(&self) -> Option<&str> {
        match self.redirect_uris.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    pub fn verify_secret(&self, provided: Option<&str>) -> bool {
        provided.is_some_and(|secret| {
            secret
                .as_bytes()
                .ct_eq(self.client_secret.as_bytes())
                .into()
        })
    }
}

/// Registration request body.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ClientMetadata {
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    pub scope: Option<String>,
}

/// Storage backing for client registrations.
pub trait ClientStore: Send + Sync {
    /// Inserts the registration unless the id is taken. Returns whether it was stored.
    fn insert(&self, registration: ClientRegistration) -> bool;
    fn get(&self, client_id: &str) -> Option<ClientRegistration>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemoryClientStore {
    clients: DashMap<String, ClientRegistration>,
}

impl ClientStore for InMemoryClientStore {
    fn insert(&self, registration: ClientRegistration) -> bool {
        match self.clients.entry(registration.client_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(registration);
                true
            }
        }
    }

    fn get(&self, client_id: &str) -> Option<ClientRegistration> {
        self.clients.get(client_id).map(|c| c.value().clone())
    }

    fn len(&self) -> usize {
        self.clients.len()
    }
}

#[derive(Clone)]
pub struct ClientRegistry {
    store: Arc<dyn ClientStore>,
    default_scope: String,
}

impl ClientRegistry {
    pub fn new(store: Arc<dyn ClientStore>, default_scope: impl Into<String>) -> Self {
        Self {
            store,
            default_scope: default_scope.into(),
        }
    }

    pub fn in_memory(default_scope: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemoryClientStore::default()), default_scope)
    }

    /// Registers a client and returns the record including its secret.
    ///
    /// This is the only point at which the secret is handed out.
    pub fn register(&self, metadata: ClientMetadata) -> Result<ClientRegistration, OAuthError> {
        if metadata.redirect_uris.is_empty() {
            return Err(OAuthError::InvalidClientMetadata(
                "At least one redirect_uri is required".into(),
            ));
        }
        for uri in &metadata.redirect_uris {
            let parsed = url::Url::parse(uri).map_err(|_| {
                OAuthError::InvalidClientMetadata(format!("Invalid redirect_uri: {uri}"))
            })?;
            if parsed.fragment().is_some() {
                return Err(OAuthError::InvalidClientMetadata(format!(
                    "redirect_uri must not contain a fragment: {uri}"
                )));
            }
        }

        let mut registration = ClientRegistration {
            client_id: String::new(),
            client_secret: random_urlsafe(32),
            client_name: metadata
                .client_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
            redirect_uris: metadata.redirect_uris,
            grant_types: metadata.grant_types.unwrap_or_else(|| {
                vec!["authorization_code".to_string(), "refresh_token".to_string()]
            }),
            response_types: metadata
                .response_types
                .unwrap_or_else(|| vec!["code".to_string()]),
            scope: metadata
                .scope
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| self.default_scope.clone()),
            created_at: OffsetDateTime::now_utc(),
        };

        for _ in 0..MAX_ID_ATTEMPTS {
            registration.client_id = format!("mcp_{}", random_urlsafe(16));
            if self.store.insert(registration.clone()) {
                tracing::info!(
                    client_id = %registration.client_id,
                    client_name = %registration.client_name,
                    "registered OAuth client"
                );
                return Ok(registration);
            }
        }

        Err(OAuthError::ServerError(
            "Could not allocate a unique client_id".into(),
        ))
    }

    pub fn lookup(&self, client_id: &str) -> Option<ClientRegistration> {
        self.store.get(client_id)
    }

    /// Looks up the client and checks its secret.
    pub fn authenticate(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<ClientRegistration, OAuthError> {
        let client = self
            .lookup(client_id)
            .ok_or_else(|| OAuthError::InvalidClient("Unknown client".into()))?;
        if !client.verify_secret(client_secret) {
            tracing::warn!(client_id, "client authentication failed");
            return Err(OAuthError::InvalidClient(
                "Client authentication failed".into(),
            ));
        }
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
