//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::mcp::MCP_TAG;
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        AuthorizationCode, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme,
    },
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // Opaque access token from /oauth/token
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "Access token obtained from the `/oauth/token` endpoint.",
                ))
                .build();
            components.add_security_scheme("bearer", SecurityScheme::Http(bearer));

            let oauth2 = OAuth2::new([Flow::AuthorizationCode(AuthorizationCode::new(
                "/oauth/authorize",
                "/oauth/token",
                Scopes::from_iter([
                    ("mcp:tools", "Call MCP tools"),
                    ("youtube:readonly", "Read the linked music library"),
                    ("youtube:manage_playlists", "Create and edit playlists"),
                ]),
            ))]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Music MCP Server API",
        version = "1.0.0",
        description = "MCP tool server for a music account, protected by OAuth 2.0 with PKCE."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization server and upstream account linking"),
        (name = MCP_TAG, description = "JSON-RPC tool endpoint")
    )
)]
pub struct ApiDoc;
