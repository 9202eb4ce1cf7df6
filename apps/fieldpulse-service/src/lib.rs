use std::sync::Arc;
use std::time::SystemTime;

use axum::{Json, Router};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use fieldpulse_ai::{AiError, PromptService};
use fieldpulse_app_state::{SyncContext, SyncError, SyncOptions};
use fieldpulse_domain::{ApiKey, Customer, Estimate, Invoice, Job, Webhook};
use fieldpulse_store::{DocumentStore, MemoryDocumentStore, StoreError};
use hmac::Hmac;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod api_envelope;
pub mod config;
mod ai_routes;
mod records;
mod webhooks;

use crate::api_envelope::{
    ApiErrorCode, ApiErrorTuple, error_response, not_found_error, validation_error,
};
use crate::config::Config;

pub use crate::records::SeedCounts;

const SERVICE_NAME: &str = "fieldpulse-service";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    sync: Arc<SyncContext>,
    ai: Arc<PromptService>,
    started_at: SystemTime,
}

impl AppState {
    /// Opens and leases the configured store, then starts real-time sync over it.
    pub async fn from_config(config: Config) -> Result<Self, SyncError> {
        let store: Arc<dyn DocumentStore> = match config.store_path.as_ref() {
            Some(path) => Arc::new(MemoryDocumentStore::open_leased(
                path,
                Some(config.service_url()),
            )?),
            None => Arc::new(MemoryDocumentStore::in_memory()),
        };
        let ai = Arc::new(PromptService::new(&config.ai));
        Self::with_parts(config, store, ai).await
    }

    pub async fn with_parts(
        config: Config,
        store: Arc<dyn DocumentStore>,
        ai: Arc<PromptService>,
    ) -> Result<Self, SyncError> {
        let sync = SyncContext::new(
            Arc::clone(&store),
            SyncOptions {
                page_size: config.sync_page_size,
                real_time: true,
            },
        );
        sync.start().await?;
        Ok(Self {
            config: Arc::new(config),
            store,
            sync: Arc::new(sync),
            ai,
            started_at: SystemTime::now(),
        })
    }

    pub fn sync(&self) -> &SyncContext {
        &self.sync
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route(
            "/api/webhooks",
            post(webhooks::receive_webhook).get(webhooks::webhook_status),
        )
        .nest(
            "/api/v1/customers",
            records::record_routes::<Customer>()
                .route("/search", get(records::search_customers)),
        )
        .nest(
            "/api/v1/jobs",
            records::record_routes::<Job>()
                .route("/search", get(records::search_jobs))
                .route("/by-status/:status", get(records::jobs_by_status)),
        )
        .nest("/api/v1/estimates", records::record_routes::<Estimate>())
        .nest("/api/v1/invoices", records::record_routes::<Invoice>())
        .nest("/api/v1/webhooks", records::record_routes::<Webhook>())
        .nest("/api/v1/api-keys", records::record_routes::<ApiKey>())
        .route("/api/v1/webhook-events", get(records::webhook_events))
        .route("/api/v1/dashboard/stats", get(records::dashboard_stats))
        .route("/api/v1/sync/real-time", post(records::set_real_time))
        .route("/api/v1/sync/refresh", post(records::refresh))
        .route("/api/v1/admin/seed", post(records::seed))
        .route("/api/v1/ai/automations", get(ai_routes::automations))
        .route("/api/v1/ai/jobs/:id/analysis", post(ai_routes::analyze_job))
        .route("/api/v1/ai/estimates", post(ai_routes::generate_estimate))
        .route(
            "/api/v1/ai/customer-response",
            post(ai_routes::customer_response),
        )
        .route("/api/v1/ai/maintenance", post(ai_routes::predict_maintenance))
        .route("/api/v1/ai/schedule", post(ai_routes::optimize_schedule))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        )
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = match state.started_at.elapsed() {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    };

    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
    })
}

fn header_string(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Decodes a JSON request body into the error envelope on failure.
fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiErrorTuple> {
    serde_json::from_slice(body).map_err(|error| {
        error_response(
            ApiErrorCode::InvalidRequest,
            format!("Request body is not valid: {error}"),
        )
    })
}

fn store_error_response(error: StoreError) -> ApiErrorTuple {
    match error {
        StoreError::NotFound { collection, id } => {
            not_found_error(format!("{collection} record '{id}' was not found"))
        }
        StoreError::Validation(error) => validation_error(error.field, &error.message),
        StoreError::Held { .. } => {
            error_response(ApiErrorCode::ServiceUnavailable, error.to_string())
        }
        other => {
            tracing::error!(target: "fieldpulse.service", error = %other, "store operation failed");
            error_response(ApiErrorCode::InternalError, "Internal server error")
        }
    }
}

fn sync_error_response(error: SyncError) -> ApiErrorTuple {
    match error {
        SyncError::Store(error) => store_error_response(error),
    }
}

fn ai_error_response(error: AiError) -> ApiErrorTuple {
    match error {
        AiError::NotConfigured => {
            error_response(ApiErrorCode::ServiceUnavailable, error.to_string())
        }
        other => {
            tracing::warn!(target: "fieldpulse.service", error = %other, "ai completion failed");
            error_response(ApiErrorCode::UpstreamError, other.to_string())
        }
    }
}

#[cfg(test)]
mod tests;
