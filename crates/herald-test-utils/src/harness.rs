// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tokio::sync::broadcast;
use tower::ServiceExt;

use herald_bus::EventBus;
use herald_config::HeraldConfig;
use herald_core::{Envelope, HeraldError, RecordStore};
use herald_engine::Engine;
use herald_gateway::{AppState, AuthConfig, router};
use herald_storage::SqliteStore;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: HeraldConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: HeraldConfig::default(),
        }
    }

    /// Seconds before a processing job counts as abandoned.
    pub fn with_stale_timeout_secs(mut self, secs: u64) -> Self {
        self.config.queue.stale_timeout_secs = secs;
        self
    }

    /// Require `Authorization: Bearer <token>` on `/api` routes.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.config.server.bearer_token = Some(token.into());
        self
    }

    /// Replace the whole configuration. The storage path is still overridden
    /// with a temp file.
    pub fn with_config(mut self, config: HeraldConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the harness on a fresh SQLite file in a temp directory.
    pub async fn build(mut self) -> Result<TestHarness, HeraldError> {
        let temp_dir = tempfile::TempDir::new().map_err(HeraldError::storage)?;
        self.config.storage.database_path = temp_dir
            .path()
            .join("herald-test.db")
            .to_string_lossy()
            .into_owned();

        let store = SqliteStore::new(self.config.storage.clone());
        store.initialize().await?;
        let store: Arc<dyn RecordStore> = Arc::new(store);

        let bus = EventBus::new(self.config.server.event_channel_capacity);
        let engine = Engine::new(Arc::clone(&store), bus.clone(), &self.config);
        let state = AppState::new(
            engine.clone(),
            bus.clone(),
            AuthConfig::new(self.config.server.bearer_token.clone()),
        );

        Ok(TestHarness {
            router: router(state),
            engine,
            store,
            bus,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete Herald stack backed by a temp database.
pub struct TestHarness {
    /// The gateway router, driven in-process.
    pub router: Router,
    /// Engine services wired to the same store and bus as the router.
    pub engine: Engine,
    pub store: Arc<dyn RecordStore>,
    pub bus: EventBus,
    pub config: HeraldConfig,
    /// Kept alive so the database outlives the harness.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default configuration.
    pub async fn new() -> Result<Self, HeraldError> {
        Self::builder().build().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.bus.subscribe()
    }

    /// Sends one request through the router and decodes the JSON response.
    /// A missing or non-JSON body decodes as `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        let Ok(request) = request else {
            return (StatusCode::BAD_REQUEST, Value::Null);
        };

        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status();
        let value = match to_bytes(response.into_body(), usize::MAX).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, &[]).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), &[]).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(body), &[]).await
    }

    /// Names of the events received on `rx` so far, in order.
    pub fn drain_events(rx: &mut broadcast::Receiver<Envelope>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            names.push(envelope.event);
        }
        names
    }
}
