// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Herald delivery engine.
//!
//! Exposes the engine services as a JSON REST API under `/api`, streams every
//! bus event to websocket subscribers on `/ws`, and answers an unauthenticated
//! `/health` probe.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod operator;
pub mod server;
pub mod ws;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use herald_bus::EventBus;
use herald_config::model::ServerConfig;
use herald_core::{AdapterType, HeraldError, HealthStatus, PluginAdapter};
use herald_engine::Engine;

pub use auth::AuthConfig;
pub use error::ApiError;
pub use server::{AppState, router};

/// The gateway server as a managed adapter.
pub struct Gateway {
    host: String,
    port: u16,
    state: AppState,
    server_handle: Mutex<Option<JoinHandle<Result<(), HeraldError>>>>,
}

impl Gateway {
    pub fn new(config: &ServerConfig, engine: Engine, bus: EventBus) -> Self {
        let auth = AuthConfig::new(config.bearer_token.clone());
        Self {
            host: config.host.clone(),
            port: config.port,
            state: AppState::new(engine, bus, auth),
            server_handle: Mutex::new(None),
        }
    }

    /// Ties the server lifetime to an externally owned token.
    pub fn with_shutdown(mut self, shutdown: tokio_util::sync::CancellationToken) -> Self {
        self.state = self.state.with_shutdown(shutdown);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Spawns the server on the tokio runtime. Calling it twice is a no-op.
    pub async fn start(&self) -> Result<(), HeraldError> {
        let mut handle = self.server_handle.lock().await;
        if handle.is_some() {
            return Ok(());
        }
        if !self.state.auth.is_enabled() {
            tracing::warn!(host = %self.host, "gateway running without bearer token authentication");
        }

        let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                HeraldError::Internal(format!(
                    "failed to bind gateway to {}:{}: {e}",
                    self.host, self.port
                ))
            })?;
        let state = self.state.clone();
        *handle = Some(tokio::spawn(server::serve_on(listener, state)));
        Ok(())
    }

    /// Waits for the server task to finish, e.g. after a shutdown signal.
    pub async fn wait(&self) -> Result<(), HeraldError> {
        let handle = self.server_handle.lock().await.take();
        match handle {
            Some(h) => h
                .await
                .map_err(|e| HeraldError::Internal(format!("gateway task failed: {e}")))?,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PluginAdapter for Gateway {
    fn name(&self) -> &str {
        "gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, HeraldError> {
        let handle = self.server_handle.lock().await;
        match handle.as_ref() {
            Some(h) if !h.is_finished() => Ok(HealthStatus::Healthy),
            Some(_) => Ok(HealthStatus::Unhealthy("server stopped".to_string())),
            None => Ok(HealthStatus::Unhealthy("server not started".to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), HeraldError> {
        self.state.shutdown.cancel();
        self.wait().await
    }
}
