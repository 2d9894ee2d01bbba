//! HTTP Server
//!
//! Router assembly and the serve loop.
//!
//! ```text
//!              Router (AppState)
//!                    │
//!     ┌──────────────┼──────────────────┐
//!     │              │                  │
//! POST /api/chat  GET /api/resources  GET /health
//! (body limit)    (development only)
//!     │
//! ChatService ──▶ streamed body
//! ```

use std::future::Future;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

use chat_core::backend::api_client;
use chat_core::{ChatConfig, ChatService, Environment, ResourceCatalog};

use crate::routes;

/// Chat endpoint path
pub const CHAT_PATH: &str = "/api/chat";
/// Resource listing endpoint path (development only)
pub const RESOURCES_PATH: &str = "/api/resources";
/// Health endpoint path
pub const HEALTH_PATH: &str = "/health";

/// Shared handler state
#[derive(Clone, Debug)]
pub struct AppState {
    /// Request path from input to encoded body
    pub chat: ChatService,
    /// Deployment environment (gates diagnostics)
    pub environment: Environment,
    /// Resource catalog, present only in development
    pub resources: Option<ResourceCatalog>,
}

impl AppState {
    /// Build state for a validated configuration
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let chat = ChatService::from_config(config).context("Failed to build chat service")?;

        let resources = if config.environment.is_development() {
            match api_client(config) {
                Ok(client) => Some(ResourceCatalog::new(client)),
                Err(e) => {
                    warn!(error = %e, "Resource listing unavailable");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            chat,
            environment: config.environment,
            resources,
        })
    }
}

/// Assemble the router
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            CHAT_PATH,
            post(routes::chat).layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .route(RESOURCES_PATH, get(routes::resources))
        .route(HEALTH_PATH, get(routes::health))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(config: &ChatConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = AppState::from_config(config)?;
    info!(
        format = %state.chat.format(),
        environment = %state.environment,
        resources = state.resources.is_some(),
        "Chat service ready"
    );

    let app = build_router(state, config.max_body_bytes);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server stopped with an error")?;

    info!("HTTP server drained");
    Ok(())
}
