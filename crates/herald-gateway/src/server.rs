// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post, put},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use herald_bus::{EventBus, events};
use herald_core::HeraldError;
use herald_engine::Engine;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers::{self, campaigns, conversations, messages};
use crate::ws;

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub bus: EventBus,
    pub auth: AuthConfig,
    pub health: HealthState,
    /// Cancelled on shutdown so long-lived websocket loops exit.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: Engine, bus: EventBus, auth: AuthConfig) -> Self {
        Self {
            engine,
            bus,
            auth,
            health: HealthState {
                start_time: std::time::Instant::now(),
            },
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Builds the full router:
/// - `GET /health` (public)
/// - `/api/campaigns/...` and `/api/messages/...` (bearer auth)
/// - `GET /ws` (auth during the handshake)
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/api/campaigns",
            post(campaigns::create_campaign).get(campaigns::list_campaigns),
        )
        .route(
            "/api/campaigns/{id}",
            get(campaigns::get_campaign).delete(campaigns::delete_campaign),
        )
        .route(
            "/api/campaigns/{id}/failures",
            get(campaigns::get_campaign_failures),
        )
        .route(
            "/api/campaigns/{id}/status",
            patch(campaigns::update_campaign_status),
        )
        .route("/api/messages", get(messages::list_messages))
        .route("/api/messages/next", get(messages::next_job))
        .route("/api/messages/status", post(messages::post_job_status))
        .route("/api/messages/inbound", post(messages::register_inbound))
        .route(
            "/api/messages/outbound/manual",
            post(messages::register_manual_outbound),
        )
        .route("/api/messages/{id}", patch(messages::edit_message))
        .route("/api/messages/{id}/status", put(messages::put_job_status))
        .route("/api/messages/{id}/audit", get(messages::get_audit))
        .route("/api/messages/{id}/retry", post(messages::retry_message))
        .route(
            "/api/messages/conversations",
            get(conversations::list_conversations),
        )
        .route(
            "/api/messages/conversations/{phone}/assign",
            put(conversations::assign),
        )
        .route(
            "/api/messages/conversations/{phone}/release",
            post(conversations::release),
        )
        .route(
            "/api/messages/conversations/{phone}/history",
            get(conversations::history),
        )
        .route(
            "/api/messages/conversations/{phone}/history/sync",
            post(conversations::sync_history),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds `host:port` and serves until `state.shutdown` is cancelled.
pub async fn serve(host: &str, port: u16, state: AppState) -> Result<(), HeraldError> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| HeraldError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;
    serve_on(listener, state).await
}

/// Serves on an already bound listener until `state.shutdown` is cancelled.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), HeraldError> {
    let local: SocketAddr = listener
        .local_addr()
        .map_err(|e| HeraldError::Internal(format!("gateway listener has no address: {e}")))?;
    let shutdown = state.shutdown.clone();
    let bus = state.bus.clone();
    let app = router(state);

    tracing::info!(addr = %local, "gateway server listening");
    bus.emit(
        events::SERVER_STARTED,
        json!({ "host": local.ip().to_string(), "port": local.port() }),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| HeraldError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway server stopped");
    Ok(())
}
