// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use courier_core::CourierError;
use courier_dispatch::Courier;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub courier: Courier,
    pub auth: AuthConfig,
    /// Externally visible base URL; webhook signatures are computed over it.
    pub public_base_url: Option<String>,
    /// Process start time for uptime reporting.
    pub start_time: std::time::Instant,
}

impl GatewayState {
    pub fn new(courier: Courier, auth: AuthConfig) -> Self {
        Self {
            courier,
            auth,
            public_base_url: None,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_public_base_url(mut self, url: Option<String>) -> Self {
        self.public_base_url = url.map(|u| u.trim_end_matches('/').to_string());
        self
    }
}

/// Gateway server configuration (mirrors `GatewayConfig` from courier-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// All gateway routes:
/// - GET /health, POST /webhooks/{provider}, GET /unsubscribe/{token} (public)
/// - POST /v1/communications, POST /v1/communications/schedule,
///   POST /v1/communications/{id}/cancel, GET /v1/communications/{id} (bearer)
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/webhooks/{provider}", post(handlers::post_webhook))
        .route("/unsubscribe/{token}", get(handlers::get_unsubscribe))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/communications", post(handlers::post_communication))
        .route(
            "/v1/communications/schedule",
            post(handlers::post_schedule),
        )
        .route("/v1/communications/{id}", get(handlers::get_communication))
        .route(
            "/v1/communications/{id}/cancel",
            post(handlers::post_cancel),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), CourierError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CourierError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| CourierError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
