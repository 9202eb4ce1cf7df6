use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use fieldpulse_ai::{AiError, CompletionRequest, CompletionTransport, PromptService};
use fieldpulse_domain::Collection;
use fieldpulse_store::{DocumentStore, MemoryDocumentStore, StoreError, StoreLease};
use hmac::Mac;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::config::Config;
use crate::webhooks::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::{AppState, build_router};

async fn test_state(config: Config) -> Result<(AppState, MemoryDocumentStore)> {
    let store = MemoryDocumentStore::in_memory();
    let ai = Arc::new(PromptService::new(&config.ai));
    let state = AppState::with_parts(config, Arc::new(store.clone()), ai).await?;
    Ok((state, store))
}

async fn read_json(response: axum::response::Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = serde_json::from_slice::<Value>(&bytes)?;
    Ok(value)
}

fn json_request(method: &str, uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn webhook_request(signature: &str, timestamp: i64, body: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri("/api/webhooks")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .header(TIMESTAMP_HEADER, timestamp.to_string())
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn healthz_route_returns_ok() -> Result<()> {
    let (state, _) = test_state(Config::for_tests()).await?;
    let app = build_router(state);
    let request = Request::builder().uri("/healthz").body(Body::empty())?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = read_json(response).await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "fieldpulse-service");
    Ok(())
}

#[tokio::test]
async fn stale_webhook_is_rejected_whatever_the_payload() -> Result<()> {
    let (state, store) = test_state(Config::for_tests()).await?;
    let app = build_router(state);
    let stale = Utc::now().timestamp() - 301;

    for body in [r#"{"event":"job.created","data":{"jobId":"j1"}}"#, "not json"] {
        let response = app
            .clone()
            .oneshot(webhook_request("sig", stale, body)?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await?;
        assert_eq!(body["message"], "Invalid webhook signature");
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    assert!(store.list(Collection::WebhookEvents, None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn fresh_webhook_is_processed_and_recorded() -> Result<()> {
    let (state, store) = test_state(Config::for_tests()).await?;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(webhook_request(
            "sig",
            Utc::now().timestamp(),
            r#"{"event":"job.completed","data":{"jobId":"j1"}}"#,
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Webhook processed successfully");
    let event_id = body["eventId"].as_str().unwrap_or_default().to_string();
    assert!(event_id.starts_with("evt_"));

    let events = store.list(Collection::WebhookEvents, None).await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "job.completed");
    assert_eq!(events[0]["status"], "success");
    assert_eq!(events[0]["payload"]["eventId"], event_id.as_str());
    assert_eq!(events[0]["payload"]["data"]["jobId"], "j1");

    let response = app
        .oneshot(Request::builder().uri("/api/v1/webhook-events").body(Body::empty())?)
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn webhook_without_signature_or_json_body_fails() -> Result<()> {
    let (state, _) = test_state(Config::for_tests()).await?;
    let app = build_router(state);

    let missing = Request::builder()
        .method("POST")
        .uri("/api/webhooks")
        .header(TIMESTAMP_HEADER, Utc::now().timestamp().to_string())
        .body(Body::from("{}"))?;
    let response = app.clone().oneshot(missing).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(webhook_request("sig", Utc::now().timestamp(), "not json")?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await?;
    assert_eq!(body["error"]["code"], "invalid_request");
    Ok(())
}

#[tokio::test]
async fn webhook_secret_requires_matching_hmac() -> Result<()> {
    let mut config = Config::for_tests();
    config.webhook_secret = Some("whsec_test".to_string());
    let (state, _) = test_state(config).await?;
    let app = build_router(state);

    let timestamp = Utc::now().timestamp();
    let body = r#"{"event":"invoice.paid","data":{"invoiceId":"inv_1"}}"#;
    let mut mac = super::HmacSha256::new_from_slice(b"whsec_test")?;
    mac.update(format!("{timestamp}.{body}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let response = app
        .clone()
        .oneshot(webhook_request(&signature, timestamp, body)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(webhook_request("deadbeef", timestamp, body)?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn webhook_status_stub_reports_fixed_data() -> Result<()> {
    let (state, _) = test_state(Config::for_tests()).await?;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/webhooks?id=wh_9").body(Body::empty())?)
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["webhookId"], "wh_9");
    assert_eq!(body["totalEvents"], 42);

    let response = app
        .oneshot(Request::builder().uri("/api/webhooks").body(Body::empty())?)
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["webhooks"][0]["name"], "OpenAI Job Analysis");
    assert_eq!(body["webhooks"][1]["totalEvents"], 89);
    Ok(())
}

#[tokio::test]
async fn records_round_trip_through_data_routes() -> Result<()> {
    let (state, _) = test_state(Config::for_tests()).await?;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customers",
            &json!({ "name": "Ada Lovelace", "email": "ada@example.com" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let customer_id = read_json(response).await?["data"]["id"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/jobs",
            &json!({ "customer_id": customer_id, "title": "Install Panel", "status": "scheduled" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let job_id = read_json(response).await?["data"]["id"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/v1/jobs/{job_id}"),
            &json!({ "status": "in_progress" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/dashboard/stats").body(Body::empty())?)
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"]["total_customers"], 1);
    assert_eq!(body["data"]["active_jobs"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/jobs/by-status/in_progress")
                .body(Body::empty())?,
        )
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"][0]["title"], "Install Panel");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/customers/search?q=ADA")
                .body(Body::empty())?,
        )
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"][0]["email"], "ada@example.com");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/jobs/{job_id}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/jobs/{job_id}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await?;
    assert_eq!(body["error"]["code"], "not_found");
    Ok(())
}

#[tokio::test]
async fn invalid_records_and_filters_are_rejected() -> Result<()> {
    let (state, _) = test_state(Config::for_tests()).await?;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/customers", &json!({ "name": "  " }))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await?;
    assert!(body["errors"]["name"].is_array());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/jobs/by-status/paused")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/jobs/search").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(json_request(
            "PATCH",
            "/api/v1/invoices/doc_missing",
            &json!({ "status": "paid" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn sync_toggle_keeps_single_subscription_set() -> Result<()> {
    let (state, store) = test_state(Config::for_tests()).await?;
    let app = build_router(state);
    let registry = store.listener_registry();
    assert_eq!(registry.active_count(Collection::Jobs), 1);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/sync/real-time", &json!({ "enabled": false }))?)
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"]["real_time"], false);
    assert_eq!(registry.active_count(Collection::Jobs), 0);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/sync/real-time", &json!({ "enabled": true }))?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(registry.active_count(Collection::Jobs), 1);
    assert_eq!(registry.active_count(Collection::ApiKeys), 1);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/sync/refresh")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn ai_routes_report_missing_credentials() -> Result<()> {
    let (state, _) = test_state(Config::for_tests()).await?;
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/ai/customer-response",
            &json!({ "query": "When is my technician arriving?" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await?;
    assert_eq!(body["error"]["code"], "service_unavailable");
    assert_eq!(body["message"], "OpenAI integration not configured");
    Ok(())
}

#[tokio::test]
async fn ai_routes_check_credentials_before_record_lookups() -> Result<()> {
    let (state, _) = test_state(Config::for_tests()).await?;
    let app = build_router(state);

    let requests = [
        Request::builder()
            .method("POST")
            .uri("/api/v1/ai/jobs/doc_missing/analysis")
            .body(Body::empty())?,
        json_request(
            "POST",
            "/api/v1/ai/estimates",
            &json!({ "jobDescription": "Replace water heater", "customerId": "doc_missing" }),
        )?,
        json_request(
            "POST",
            "/api/v1/ai/schedule",
            &json!({ "jobIds": ["doc_missing"], "technicians": [] }),
        )?,
    ];
    for request in requests {
        let response = app.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = read_json(response).await?;
        assert_eq!(body["error"]["code"], "service_unavailable");
    }
    Ok(())
}

#[tokio::test]
async fn stored_credentials_are_masked_in_responses() -> Result<()> {
    let (state, _) = test_state(Config::for_tests()).await?;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/api-keys",
            &json!({
                "name": "OpenAI production",
                "service": "openai",
                "key": "sk-live-0123456789abcd",
                "permissions": ["read", "write"],
            }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let key_id = read_json(response).await?["data"]["id"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/webhooks",
            &json!({
                "name": "Slack Notifications",
                "url": "https://hooks.example.com/slack",
                "events": ["job.completed"],
                "secret": "whsec_signing_secret",
            }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let webhook_id = read_json(response).await?["data"]["id"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    for uri in [
        "/api/v1/api-keys".to_string(),
        format!("/api/v1/api-keys/{key_id}"),
        "/api/v1/webhooks".to_string(),
        format!("/api/v1/webhooks/{webhook_id}"),
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(&uri).body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await?.to_string();
        assert!(!body.contains("sk-live-0123456789abcd"), "{uri} leaked the key");
        assert!(!body.contains("whsec_signing_secret"), "{uri} leaked the secret");
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/api-keys/{key_id}"))
                .body(Body::empty())?,
        )
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"]["key"], "****abcd");
    assert_eq!(body["data"]["permissions"], json!(["read", "write"]));
    Ok(())
}

#[tokio::test]
async fn seed_route_writes_through_the_leased_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("documents.json");
    let mut config = Config::for_tests();
    config.store_path = Some(path.clone());

    let state = AppState::from_config(config).await?;
    let holder = StoreLease::holder(&path).ok_or_else(|| anyhow::anyhow!("lease not taken"))?;
    assert_eq!(holder.pid, std::process::id());

    // A second handle on the same file, as the ops CLI would open it.
    let outside = MemoryDocumentStore::open(&path);
    let refused = outside
        .create(Collection::Customers, serde_json::Map::new())
        .await;
    assert!(matches!(refused, Err(StoreError::Held { .. })));

    let app = build_router(state);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/admin/seed")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await?;
    assert_eq!(body["data"]["customers"], 3);
    assert_eq!(body["data"]["jobs"], 3);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customers",
            &json!({ "name": "Ada Lovelace" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/customers").body(Body::empty())?)
        .await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(4));

    let reopened = MemoryDocumentStore::open(&path);
    assert_eq!(reopened.list(Collection::Customers, None).await?.len(), 4);
    assert_eq!(reopened.list(Collection::Jobs, None).await?.len(), 3);
    Ok(())
}

struct ScriptedTransport {
    replies: Mutex<VecDeque<Option<String>>>,
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn complete(&self, _request: CompletionRequest) -> Result<Option<String>, AiError> {
        Ok(self
            .replies
            .lock()
            .map_err(|_| AiError::Transport {
                message: "poisoned".to_string(),
            })?
            .pop_front()
            .flatten())
    }
}

#[tokio::test]
async fn ai_routes_use_configured_transport() -> Result<()> {
    let transport = Arc::new(ScriptedTransport {
        replies: Mutex::new(VecDeque::from([
            Some(
                r#"{"riskLevel":"high","recommendedActions":["Replace capacitor"],"timeframe":"2 weeks","reasoning":"Age"}"#
                    .to_string(),
            ),
            Some("not json".to_string()),
        ])),
    });
    let store = MemoryDocumentStore::in_memory();
    let state = AppState::with_parts(
        Config::for_tests(),
        Arc::new(store),
        Arc::new(PromptService::with_transport(transport)),
    )
    .await?;
    let app = build_router(state);
    let report = json!({ "type": "HVAC", "age": 12, "lastService": "2025-01-10", "issues": ["noise"] });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/ai/maintenance", &report)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["data"]["riskLevel"], "high");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/ai/maintenance", &report)?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/ai/jobs/doc_missing/analysis")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
