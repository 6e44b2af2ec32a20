// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald serve` command implementation.
//!
//! Opens the SQLite record store, wires the event bus (with webhook targets
//! when configured) and the engine services, then runs the gateway until
//! SIGINT or SIGTERM.

use std::sync::Arc;

use herald_bus::{EventBus, WebhookDispatcher};
use herald_config::HeraldConfig;
use herald_core::{HeraldError, PluginAdapter, RecordStore};
use herald_engine::Engine;
use herald_gateway::Gateway;
use herald_storage::SqliteStore;
use tracing::{info, warn};

use crate::shutdown;

/// Runs the `herald serve` command.
pub async fn run_serve(config: HeraldConfig) -> Result<(), HeraldError> {
    init_tracing(&config.service.log_level);

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "starting herald serve"
    );

    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;
    let store = Arc::new(store);
    info!(path = %config.storage.database_path, "record store ready");

    let webhooks = WebhookDispatcher::from_config(&config.webhook)?;
    if !webhooks.is_empty() {
        info!(targets = webhooks.targets().len(), "webhook delivery enabled");
    }
    let bus = EventBus::new(config.server.event_channel_capacity).with_webhooks(webhooks);

    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        bus.clone(),
        &config,
    );

    let cancel = shutdown::install_signal_handler();
    let gateway = Gateway::new(&config.server, engine, bus).with_shutdown(cancel.clone());
    gateway.start().await?;

    let served = gateway.wait().await;
    if let Err(e) = &served {
        warn!(error = %e, "gateway exited with error");
    }

    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "record store shutdown failed");
    }
    info!("herald stopped");
    served
}

/// Initializes the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("herald={log_level},tower_http={log_level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
