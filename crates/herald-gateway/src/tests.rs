// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use herald_bus::EventBus;
use herald_config::HeraldConfig;
use herald_config::model::StorageConfig;
use herald_core::RecordStore;
use herald_engine::Engine;
use herald_storage::SqliteStore;

use crate::auth::AuthConfig;
use crate::server::{AppState, router};

struct TestApp {
    router: Router,
    _dir: TempDir,
}

async fn test_app(token: Option<&str>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(StorageConfig {
        database_path: dir.path().join("gateway.db").to_string_lossy().into_owned(),
        wal_mode: true,
    });
    store.initialize().await.unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(store);
    let bus = EventBus::new(64);
    let engine = Engine::new(store, bus.clone(), &HeraldConfig::default());
    let state = AppState::new(engine, bus, AuthConfig::new(token.map(str::to_string)));
    TestApp {
        router: router(state),
        _dir: dir,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_with(method, uri, body, &[]).await
    }

    async fn call_with(
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
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_campaign(&self, phones: &[&str]) -> String {
        let contacts: Vec<Value> = phones
            .iter()
            .map(|p| json!({ "phone": p, "name": "Contact" }))
            .collect();
        let (status, body) = self
            .call(
                Method::POST,
                "/api/campaigns",
                Some(json!({
                    "name": "Launch",
                    "messageTemplate": "Hello {name}",
                    "contacts": contacts,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_is_public_and_api_requires_token() {
    let app = test_app(Some("s3cret")).await;

    let (status, body) = app.call(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = app.call(Method::GET, "/api/campaigns", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call_with(
            Method::GET,
            "/api/campaigns",
            None,
            &[(AUTHORIZATION.as_str(), "Bearer wrong")],
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call_with(
            Method::GET,
            "/api/campaigns",
            None,
            &[(AUTHORIZATION.as_str(), "Bearer s3cret")],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn claim_send_and_retry_flow() {
    let app = test_app(None).await;
    let campaign_id = app.create_campaign(&["11987654321", "11912345678"]).await;

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/messages/next?campaignId={campaign_id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let job = &body["job"];
    assert_eq!(job["status"], "processing");
    assert_eq!(job["campaign"]["id"], campaign_id.as_str());
    let job_id = job["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/messages/{job_id}/status"),
            Some(json!({ "status": "sent" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "sent");

    let (_, campaign) = app
        .call(Method::GET, &format!("/api/campaigns/{campaign_id}"), None)
        .await;
    assert_eq!(campaign["stats"]["sent"], 1);

    let (status, body) = app
        .call(Method::POST, &format!("/api/messages/{job_id}/retry"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");

    let (_, campaign) = app
        .call(Method::GET, &format!("/api/campaigns/{campaign_id}"), None)
        .await;
    assert_eq!(campaign["stats"]["sent"], 0);

    let (status, audit) = app
        .call(Method::GET, &format!("/api/messages/{job_id}/audit"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(audit["audit"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn status_update_validation() {
    let app = test_app(None).await;
    let campaign_id = app.create_campaign(&["11987654321"]).await;
    let (_, body) = app
        .call(
            Method::GET,
            &format!("/api/messages/next?campaignId={campaign_id}"),
            None,
        )
        .await;
    let job_id = body["job"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/messages/{job_id}/status"),
            Some(json!({ "status": "exploded" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATUS");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/messages/status",
            Some(json!({ "id": job_id, "status": "failed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Unknown send error");

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/messages/does-not-exist/status",
            Some(json!({ "status": "sent" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "MESSAGE_NOT_FOUND");

    let (_, failures) = app
        .call(
            Method::GET,
            &format!("/api/campaigns/{campaign_id}/failures"),
            None,
        )
        .await;
    assert_eq!(failures["failures"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn next_job_is_null_when_queue_is_empty() {
    let app = test_app(None).await;
    let (status, body) = app.call(Method::GET, "/api/messages/next", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["job"].is_null());
}

#[tokio::test]
async fn assignment_conflict_and_force_takeover() {
    let app = test_app(None).await;
    let uri = "/api/messages/conversations/11987654321/assign";

    let (status, body) = app
        .call(Method::PUT, uri, Some(json!({ "operator": "Ana" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["assignment"]["assignedTo"], "Ana");

    let (status, body) = app
        .call(Method::PUT, uri, Some(json!({ "operator": "Beto" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONVERSATION_ALREADY_ASSIGNED");
    assert_eq!(body["owner"], "Ana");

    let (status, body) = app
        .call(
            Method::PUT,
            uri,
            Some(json!({ "operator": "Beto", "force": "true" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assignment"]["assignedTo"], "Beto");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/messages/conversations/11987654321/release",
            Some(json!({ "operator": "Ana" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONVERSATION_ASSIGNED_TO_OTHER_OPERATOR");

    let (status, body) = app
        .call_with(
            Method::POST,
            "/api/messages/conversations/11987654321/release",
            None,
            &[("x-operator-id", "Beto")],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assignment"]["status"], "closed");
}

#[tokio::test]
async fn history_requires_operator_and_ownership() {
    let app = test_app(None).await;
    app.create_campaign(&["11987654321"]).await;
    let history = "/api/messages/conversations/11987654321/history";

    let (status, body) = app.call(Method::GET, history, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "OPERATOR_REQUIRED");

    let (status, body) = app
        .call(Method::GET, &format!("{history}?operator=Ana"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "CONVERSATION_NOT_ASSIGNED");

    app.call(
        Method::PUT,
        "/api/messages/conversations/11987654321/assign",
        Some(json!({ "operator": "Ana" })),
    )
    .await;

    let (status, body) = app
        .call(Method::GET, &format!("{history}?operator=Ana"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(Method::GET, &format!("{history}?operator=Beto"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "CONVERSATION_ASSIGNED_TO_OTHER_OPERATOR");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("{history}/sync"),
            Some(json!({
                "operator": "Ana",
                "messages": [
                    { "direction": "inbound", "text": "oi", "at": "2026-03-01T10:00:00Z" },
                    { "direction": "inbound", "text": "oi", "at": "2026-03-01T10:00:10Z" },
                ],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["inserted"], 1);
    assert_eq!(body["duplicates"], 1);
    assert_eq!(body["totalReceived"], 2);
}

#[tokio::test]
async fn inbound_capture_statuses() {
    let app = test_app(None).await;
    let reply = json!({ "phone": "11987654321", "text": "quero saber mais" });

    let (status, body) = app
        .call(Method::POST, "/api/messages/inbound", Some(reply.clone()))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["ignored"], true);
    assert_eq!(body["reason"], "campaign_not_resolved");

    app.create_campaign(&["11987654321"]).await;

    let (status, body) = app
        .call(Method::POST, "/api/messages/inbound", Some(reply.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["message"]["direction"], "inbound");

    let (status, body) = app
        .call(Method::POST, "/api/messages/inbound", Some(reply))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicate"], true);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/messages/outbound/manual",
            Some(json!({ "phone": "11987654321" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TEXT_REQUIRED");

    let (_, conversations) = app
        .call(
            Method::GET,
            "/api/messages/conversations?onlyWithReplies=true",
            None,
        )
        .await;
    assert_eq!(conversations.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn campaign_status_and_delete() {
    let app = test_app(None).await;
    let campaign_id = app.create_campaign(&["11987654321"]).await;

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/campaigns/{campaign_id}/status"),
            Some(json!({ "status": "paused" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paused");

    let (_, body) = app.call(Method::GET, "/api/messages/next", None).await;
    assert!(body["job"].is_null());

    let (status, body) = app
        .call(Method::GET, "/api/campaigns?status=bogus", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_CAMPAIGN_STATUS");

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/campaigns/{campaign_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::GET, &format!("/api/campaigns/{campaign_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CAMPAIGN_NOT_FOUND");

    let (_, messages) = app.call(Method::GET, "/api/messages", None).await;
    assert!(messages.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_campaign_body_is_a_validation_error() {
    let app = test_app(None).await;
    let (status, body) = app
        .call(Method::POST, "/api/campaigns", Some(json!({ "contacts": "nope" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_BODY");
}
