//! Inbound webhook intake.
//!
//! A delivery carries `x-webhook-signature` and `x-webhook-timestamp` (unix
//! seconds). The timestamp must be within the configured tolerance of now.
//! With a secret configured the signature is the hex HMAC-SHA256 of
//! `"{timestamp}.{raw body}"`; without one, its presence is enough.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, SecondsFormat, Utc};
use fieldpulse_domain::{WebhookEvent, WebhookEventDraft, WebhookEventStatus};
use fieldpulse_store::Repository;
use hmac::Mac;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::api_envelope::{
    ApiErrorCode, ApiErrorTuple, error_response, error_response_with_status, unauthorized_error,
};
use crate::{AppState, HmacSha256, header_string, store_error_response};

const LOG_TARGET: &str = "fieldpulse.webhooks";

pub(crate) const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub(crate) const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
const INVALID_SIGNATURE_MESSAGE: &str = "Invalid webhook signature";
const EXTERNAL_SOURCE: &str = "external";
const EVENT_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const EVENT_ID_SUFFIX_LEN: usize = 9;

/// Event names with a dedicated handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WebhookEventKind {
    JobCreated,
    JobCompleted,
    EstimateApproved,
    InvoicePaid,
    AnalysisComplete,
    Unhandled,
}

impl WebhookEventKind {
    pub(crate) fn from_event(event: &str) -> Self {
        match event {
            "job.created" => Self::JobCreated,
            "job.completed" => Self::JobCompleted,
            "estimate.approved" => Self::EstimateApproved,
            "invoice.paid" => Self::InvoicePaid,
            "openai.analysis.complete" => Self::AnalysisComplete,
            _ => Self::Unhandled,
        }
    }

    /// The `data` field naming the record the event is about.
    pub(crate) const fn reference_field(self) -> Option<&'static str> {
        match self {
            Self::JobCreated | Self::JobCompleted => Some("jobId"),
            Self::EstimateApproved => Some("estimateId"),
            Self::InvoicePaid => Some("invoiceId"),
            Self::AnalysisComplete => Some("analysisId"),
            Self::Unhandled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct WebhookPayload {
    pub event: String,
    pub timestamp: String,
    pub data: Value,
    pub source: &'static str,
}

impl WebhookPayload {
    /// `event` defaults to "unknown"; `data` defaults to the whole body.
    pub(crate) fn from_body(body: Value, received_at: DateTime<Utc>) -> Self {
        let event = body
            .get("event")
            .and_then(Value::as_str)
            .filter(|event| !event.is_empty())
            .unwrap_or("unknown")
            .to_string();
        let data = match body.get("data") {
            Some(data) if !is_falsy(data) => data.clone(),
            _ => body,
        };
        Self {
            event,
            timestamp: received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
            source: EXTERNAL_SOURCE,
        }
    }
}

/// `null`, `false`, zero and the empty string.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number == 0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebhookAck {
    success: bool,
    message: &'static str,
    event_id: String,
}

pub(crate) fn verify_webhook_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: Option<&str>,
    tolerance_seconds: u64,
    now_epoch: i64,
) -> Result<(), ApiErrorTuple> {
    let invalid = || unauthorized_error(INVALID_SIGNATURE_MESSAGE);
    let signature = header_string(headers, SIGNATURE_HEADER).ok_or_else(invalid)?;
    let timestamp = header_string(headers, TIMESTAMP_HEADER).ok_or_else(invalid)?;
    let timestamp_epoch = timestamp.parse::<i64>().map_err(|_| invalid())?;

    if now_epoch.abs_diff(timestamp_epoch) > tolerance_seconds {
        tracing::warn!(
            target: LOG_TARGET,
            timestamp = timestamp_epoch,
            now = now_epoch,
            "webhook timestamp outside tolerance",
        );
        return Err(invalid());
    }

    let Some(secret) = secret else {
        return Ok(());
    };

    let provided = hex::decode(signature.trim_start_matches("sha256=")).map_err(|_| invalid())?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        error_response(
            ApiErrorCode::InternalError,
            "Webhook verification is misconfigured.",
        )
    })?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| {
        tracing::warn!(target: LOG_TARGET, "webhook signature mismatch");
        invalid()
    })
}

pub(crate) fn generate_event_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..EVENT_ID_SUFFIX_LEN)
        .map(|_| char::from(EVENT_ID_ALPHABET[rng.random_range(0..EVENT_ID_ALPHABET.len())]))
        .collect();
    format!("evt_{}_{suffix}", now.timestamp_millis())
}

/// Routes an event to its handler. Handlers only log.
pub(crate) fn dispatch_event(payload: &WebhookPayload) -> WebhookEventKind {
    let kind = WebhookEventKind::from_event(&payload.event);
    tracing::info!(target: LOG_TARGET, event = %payload.event, "processing webhook event");

    let reference = kind
        .reference_field()
        .and_then(|field| payload.data.get(field))
        .map(|value| value.as_str().map_or_else(|| value.to_string(), str::to_string))
        .unwrap_or_default();
    match kind {
        WebhookEventKind::JobCreated => {
            tracing::info!(target: LOG_TARGET, job_id = %reference, "new job created");
        }
        WebhookEventKind::JobCompleted => {
            tracing::info!(target: LOG_TARGET, job_id = %reference, "job completed");
        }
        WebhookEventKind::EstimateApproved => {
            tracing::info!(target: LOG_TARGET, estimate_id = %reference, "estimate approved");
        }
        WebhookEventKind::InvoicePaid => {
            tracing::info!(target: LOG_TARGET, invoice_id = %reference, "invoice paid");
        }
        WebhookEventKind::AnalysisComplete => {
            tracing::info!(target: LOG_TARGET, analysis_id = %reference, "ai analysis complete");
        }
        WebhookEventKind::Unhandled => {
            tracing::info!(target: LOG_TARGET, event = %payload.event, "unhandled webhook event");
        }
    }
    kind
}

pub(crate) async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), ApiErrorTuple> {
    let now = Utc::now();
    verify_webhook_signature(
        &headers,
        &body,
        state.config.webhook_secret.as_deref(),
        state.config.webhook_tolerance_seconds,
        now.timestamp(),
    )?;

    let body = serde_json::from_slice::<Value>(&body).map_err(|_| {
        error_response_with_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            ApiErrorCode::InvalidRequest,
            "Webhook body must be JSON",
        )
    })?;

    let payload = WebhookPayload::from_body(body, now);
    dispatch_event(&payload);

    let event_id = generate_event_id(now);
    let draft = WebhookEventDraft {
        webhook_id: EXTERNAL_SOURCE.to_string(),
        event: payload.event.clone(),
        payload: json!({
            "eventId": event_id,
            "event": payload.event,
            "timestamp": payload.timestamp,
            "data": payload.data,
            "source": payload.source,
        }),
        status: WebhookEventStatus::Success,
        attempts: 1,
        processed_at: Some(now),
        error: None,
    };
    Repository::<WebhookEvent>::new(state.store.clone())
        .create(&draft)
        .await
        .map_err(store_error_response)?;

    Ok((
        StatusCode::OK,
        Json(WebhookAck {
            success: true,
            message: "Webhook processed successfully",
            event_id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub(crate) struct WebhookStatusQuery {
    id: Option<String>,
}

/// Fixed status report kept for clients of the original endpoint.
pub(crate) async fn webhook_status(Query(query): Query<WebhookStatusQuery>) -> Json<Value> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    match query.id.filter(|id| !id.trim().is_empty()) {
        Some(webhook_id) => Json(json!({
            "webhookId": webhook_id,
            "status": "active",
            "lastTriggered": now,
            "totalEvents": 42,
        })),
        None => Json(json!({
            "webhooks": [
                {
                    "id": "1",
                    "name": "OpenAI Job Analysis",
                    "status": "active",
                    "lastTriggered": now,
                    "totalEvents": 156,
                },
                {
                    "id": "2",
                    "name": "Slack Notifications",
                    "status": "active",
                    "lastTriggered": now,
                    "totalEvents": 89,
                },
            ]
        })),
    }
}
