// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound webhook delivery.
//!
//! Every envelope is POSTed to every configured target. Failed attempts
//! (network error or non-2xx) are retried with linear backoff, `attempt *
//! backoff`, until `max_attempts` is exhausted; then the delivery is dropped
//! with a warning. Outcomes are not persisted.

use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{debug, warn};

use herald_config::model::WebhookConfig;
use herald_core::{Envelope, HeraldError};

/// Header carrying the envelope's event name.
pub const EVENT_HEADER: &str = "x-herald-event";
/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-herald-signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
    targets: Vec<String>,
    secret: Option<SecretString>,
    max_attempts: u32,
    backoff: Duration,
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("targets", &self.targets)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl WebhookDispatcher {
    pub fn from_config(config: &WebhookConfig) -> Result<Self, HeraldError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| HeraldError::Internal(format!("failed to build webhook client: {e}")))?;

        Ok(Self {
            client,
            targets: config.targets.clone(),
            secret: config
                .secret
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| SecretString::from(s.to_string())),
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Deliver one envelope to every target concurrently. Returns how many
    /// targets accepted it.
    pub async fn dispatch(&self, envelope: &Envelope) -> usize {
        if self.targets.is_empty() {
            return 0;
        }
        let body = match serde_json::to_vec(envelope) {
            Ok(body) => body,
            Err(e) => {
                warn!(event = %envelope.event, error = %e, "failed to serialize webhook envelope");
                return 0;
            }
        };
        let signature = self
            .secret
            .as_ref()
            .map(|secret| sign(secret.expose_secret(), &body));

        let deliveries = self
            .targets
            .iter()
            .map(|target| self.deliver(target, &envelope.event, &body, signature.as_deref()));
        futures::future::join_all(deliveries)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    async fn deliver(&self, target: &str, event: &str, body: &[u8], signature: Option<&str>) -> bool {
        for attempt in 1..=self.max_attempts {
            let mut request = self
                .client
                .post(target)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(EVENT_HEADER, event)
                .body(body.to_vec());
            if let Some(signature) = signature {
                request = request.header(SIGNATURE_HEADER, signature);
            }

            let failure = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %target, event, attempt, "webhook delivered");
                    return true;
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    format!("status {status}: {text}")
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.max_attempts {
                warn!(url = %target, event, attempt, error = %failure, "webhook delivery failed, giving up");
                break;
            }
            debug!(url = %target, event, attempt, error = %failure, "webhook attempt failed, retrying");
            tokio::time::sleep(self.backoff * attempt).await;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use tracing_test::traced_test;
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config(targets: Vec<String>, secret: Option<&str>, max_attempts: u32) -> WebhookConfig {
        WebhookConfig {
            targets,
            secret: secret.map(str::to_string),
            timeout_ms: 2000,
            max_attempts,
            backoff_ms: 10,
        }
    }

    fn envelope() -> Envelope {
        Envelope::event("messages.status.updated", serde_json::json!({"id": "m1"}))
    }

    #[test]
    fn signature_is_hex_hmac_sha256() {
        // RFC 4231 test case 2.
        let sig = sign("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let dispatcher =
            WebhookDispatcher::from_config(&config(vec![], Some("s3cret"), 2)).unwrap();
        let out = format!("{dispatcher:?}");
        assert!(!out.contains("s3cret"));
        assert!(out.contains("[redacted]"));
    }

    #[tokio::test]
    async fn delivers_signed_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header(EVENT_HEADER, "messages.status.updated"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::from_config(&config(
            vec![format!("{}/hook", server.uri())],
            Some("shh"),
            2,
        ))
        .unwrap();
        assert_eq!(dispatcher.dispatch(&envelope()).await, 1);

        let received: Vec<Request> = server.received_requests().await.unwrap();
        let body = &received[0].body;
        let sent_sig = received[0]
            .headers
            .get(SIGNATURE_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(sent_sig, sign("shh", body));

        let parsed: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed["type"], "event");
        assert_eq!(parsed["event"], "messages.status.updated");
        assert_eq!(parsed["data"]["id"], "m1");
    }

    #[tokio::test]
    async fn unsigned_without_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dispatcher =
            WebhookDispatcher::from_config(&config(vec![server.uri()], None, 1)).unwrap();
        assert_eq!(dispatcher.dispatch(&envelope()).await, 1);

        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get(SIGNATURE_HEADER).is_none());
    }

    #[tokio::test]
    async fn retries_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dispatcher =
            WebhookDispatcher::from_config(&config(vec![server.uri()], None, 2)).unwrap();
        assert_eq!(dispatcher.dispatch(&envelope()).await, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dispatcher =
            WebhookDispatcher::from_config(&config(vec![server.uri()], None, 3)).unwrap();
        assert_eq!(dispatcher.dispatch(&envelope()).await, 0);
        assert!(logs_contain("webhook delivery failed, giving up"));
    }

    #[tokio::test]
    async fn one_failing_target_does_not_affect_others() {
        let good = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&good)
            .await;
        let bad = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&bad)
            .await;

        let dispatcher = WebhookDispatcher::from_config(&config(
            vec![good.uri(), bad.uri()],
            None,
            1,
        ))
        .unwrap();
        assert_eq!(dispatcher.dispatch(&envelope()).await, 1);
    }
}
