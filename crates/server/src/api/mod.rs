//! HTTP surface.
//!
//! - `session` - signup, signin, apiauth, signout (/v1/*)
//! - `token` - code exchange, refresh, introspection, validation, permissions (/v1/*)
//! - `health` - health check (/v1/health)
//! - `openapi` - OpenAPI/Utoipa configuration, served through Redoc at /api-docs

pub mod extract;
pub mod health;
pub mod openapi;
pub mod session;
pub mod token;

pub use health::MISC_TAG;
pub use session::SESSION_TAG;
pub use token::TOKEN_TAG;

use crate::services::AuthServices;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Routes served under `/v1`.
pub fn router(services: AuthServices) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(session::signup))
        .routes(routes!(session::signin))
        .routes(routes!(session::apiauth))
        .routes(routes!(session::signout))
        .routes(routes!(token::token))
        .routes(routes!(token::refreshopenid))
        .routes(routes!(token::jwtgetdata))
        .routes(routes!(token::jwtvalidation))
        .routes(routes!(token::permission))
        .routes(routes!(health::health))
        .with_state(services)
}

/// The complete application with docs and middleware attached.
pub fn app(services: AuthServices) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/v1", router(services))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server on `addr`.
#[tracing::instrument(skip(services))]
pub async fn start_webserver(services: AuthServices, addr: &str) -> color_eyre::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "server running");
    axum::serve(listener, app(services))
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
