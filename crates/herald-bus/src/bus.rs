// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process broadcast of event envelopes.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use herald_core::Envelope;

use crate::webhook::WebhookDispatcher;

/// Default broadcast buffer per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fans every emitted envelope out to live subscribers and webhook targets.
///
/// `emit` never waits on delivery: broadcast is a non-blocking channel send
/// and webhook dispatch runs on a spawned task.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    webhooks: Option<Arc<WebhookDispatcher>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            webhooks: None,
        }
    }

    pub fn with_webhooks(mut self, dispatcher: WebhookDispatcher) -> Self {
        if !dispatcher.is_empty() {
            self.webhooks = Some(Arc::new(dispatcher));
        }
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Build an envelope for `event`, broadcast it, and hand it to the
    /// webhook dispatcher. Returns the envelope.
    pub fn emit(&self, event: &str, data: serde_json::Value) -> Envelope {
        let envelope = Envelope::event(event, data);

        if self.sender.send(envelope.clone()).is_err() {
            debug!(event, "no live subscribers");
        }

        if let Some(webhooks) = &self.webhooks {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let webhooks = Arc::clone(webhooks);
                    let envelope = envelope.clone();
                    handle.spawn(async move {
                        webhooks.dispatch(&envelope).await;
                    });
                }
                Err(_) => warn!(event, "no async runtime, webhook dispatch skipped"),
            }
        }

        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_config::model::WebhookConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn every_subscriber_receives_the_envelope() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let sent = bus.emit("campaign.created", json!({"id": "c1"}));
        assert_eq!(sent.kind, "event");

        let got_a = a.recv().await.unwrap();
        let got_b = b.recv().await.unwrap();
        assert_eq!(got_a, sent);
        assert_eq!(got_b, sent);
    }

    #[test]
    fn emit_without_subscribers_or_runtime_is_harmless() {
        let bus = EventBus::default();
        let envelope = bus.emit("system.server_started", json!({}));
        assert_eq!(envelope.event, "system.server_started");
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_affect_others() {
        let bus = EventBus::new(4);
        let dropped = bus.subscribe();
        let mut kept = bus.subscribe();
        drop(dropped);

        bus.emit("messages.retried", json!({"id": "m1"}));
        assert_eq!(kept.recv().await.unwrap().event, "messages.retried");
    }

    #[tokio::test]
    async fn emit_dispatches_webhooks_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::from_config(&WebhookConfig {
            targets: vec![server.uri()],
            ..Default::default()
        })
        .unwrap();
        let bus = EventBus::new(4).with_webhooks(dispatcher);
        bus.emit("campaign.deleted", json!({"id": "c1"}));

        for _ in 0..50 {
            if !server.received_requests().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
