//! API module providing HTTP endpoints for the MCP server.
//!
//! This module is organized into submodules:
//! - `auth` - Request gate (bearer token enforcement)
//! - `health` - Health check endpoint (/health)
//! - `openapi` - OpenAPI/Utoipa configuration
//!
//! The OAuth2 and MCP routers live in their own modules and are assembled here.

pub mod auth;
pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::{AppResources, mcp, oauth2};
use axum::{Extension, Router, middleware, routing::post};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the full application router, including the request gate.
pub fn build_router(resources: AppResources) -> Router {
    let oauth2_state = resources.oauth2.clone();
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/oauth", oauth2::router(oauth2_state.clone()))
        .merge(oauth2::well_known_router(oauth2_state.clone()))
        .merge(mcp::router())
        .routes(routes!(health::health))
        .split_for_parts();

    router
        // Some clients post JSON-RPC to the server root
        .route("/", post(mcp::handler::mcp_post))
        .merge(Redoc::with_url("/api-docs", api))
        .layer(middleware::from_fn_with_state(
            oauth2_state,
            auth::require_bearer,
        ))
        .layer(Extension(resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let addr = resources.config.bind_addr.clone();
    let router = build_router(resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
