use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use fieldpulse_app_state::SyncedEntity;
use fieldpulse_domain::{
    ApiKey, Customer, DashboardStats, Estimate, Invoice, Job, JobStatus, Webhook, WebhookEvent,
};
use fieldpulse_store::seed::{SeedSummary, seed_sample_data};
use fieldpulse_store::{Repository, queries};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api_envelope::{
    ApiDataEnvelope, ApiErrorTuple, created_data, not_found_error, ok_data, validation_error,
};
use crate::{AppState, parse_json_body, store_error_response, sync_error_response};

type DataResponse<T> = (StatusCode, Json<ApiDataEnvelope<T>>);

#[derive(Debug, Serialize)]
pub(crate) struct RecordRef {
    id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeletedRecord {
    id: String,
    deleted: bool,
}

/// What a record looks like in a response. Stored credentials never leave the
/// service in the clear.
pub(crate) trait ResponseView: Sized {
    fn into_view(self) -> Self {
        self
    }
}

impl ResponseView for Job {}
impl ResponseView for Customer {}
impl ResponseView for Estimate {}
impl ResponseView for Invoice {}

impl ResponseView for Webhook {
    fn into_view(self) -> Self {
        self.redacted()
    }
}

impl ResponseView for ApiKey {
    fn into_view(self) -> Self {
        self.redacted()
    }
}

/// List, create, read, patch and delete for one synced collection.
pub(crate) fn record_routes<E>() -> Router<AppState>
where
    E: SyncedEntity + ResponseView,
    E::Draft: DeserializeOwned,
    E::Patch: DeserializeOwned,
{
    Router::new()
        .route("/", get(list_records::<E>).post(create_record::<E>))
        .route(
            "/:id",
            get(get_record::<E>)
                .patch(update_record::<E>)
                .delete(delete_record::<E>),
        )
}

async fn list_records<E: SyncedEntity + ResponseView>(
    State(state): State<AppState>,
) -> DataResponse<Vec<E>> {
    ok_data(
        state
            .sync
            .cached::<E>()
            .into_iter()
            .map(ResponseView::into_view)
            .collect(),
    )
}

async fn get_record<E: SyncedEntity + ResponseView>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<DataResponse<E>, ApiErrorTuple> {
    if let Some(record) = state.sync.cached_by_id::<E>(&id) {
        return Ok(ok_data(record.into_view()));
    }
    // Paged collections may hold records outside the cached window.
    Repository::<E>::new(Arc::clone(&state.store))
        .get(&id)
        .await
        .map_err(store_error_response)?
        .map(|record| ok_data(record.into_view()))
        .ok_or_else(|| not_found_error(format!("{} record '{id}' was not found", E::COLLECTION)))
}

async fn create_record<E>(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<DataResponse<RecordRef>, ApiErrorTuple>
where
    E: SyncedEntity,
    E::Draft: DeserializeOwned,
{
    let draft = parse_json_body::<E::Draft>(&body)?;
    let id = state
        .sync
        .create::<E>(&draft)
        .await
        .map_err(sync_error_response)?;
    Ok(created_data(RecordRef { id }))
}

async fn update_record<E>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<DataResponse<RecordRef>, ApiErrorTuple>
where
    E: SyncedEntity,
    E::Patch: DeserializeOwned,
{
    let patch = parse_json_body::<E::Patch>(&body)?;
    state
        .sync
        .update::<E>(&id, &patch)
        .await
        .map_err(sync_error_response)?;
    Ok(ok_data(RecordRef { id }))
}

async fn delete_record<E: SyncedEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<DataResponse<DeletedRecord>, ApiErrorTuple> {
    state
        .sync
        .delete::<E>(&id)
        .await
        .map_err(sync_error_response)?;
    Ok(ok_data(DeletedRecord { id, deleted: true }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    q: Option<String>,
}

fn search_term(query: SearchQuery) -> Result<String, ApiErrorTuple> {
    query
        .q
        .map(|term| term.trim().to_string())
        .filter(|term| !term.is_empty())
        .ok_or_else(|| validation_error("q", "A search term is required."))
}

pub(crate) async fn search_jobs(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<DataResponse<Vec<Job>>, ApiErrorTuple> {
    let term = search_term(query)?;
    let jobs = queries::search_jobs(&state.store, &term)
        .await
        .map_err(store_error_response)?;
    Ok(ok_data(jobs))
}

pub(crate) async fn search_customers(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<DataResponse<Vec<Customer>>, ApiErrorTuple> {
    let term = search_term(query)?;
    let customers = queries::search_customers(&state.store, &term)
        .await
        .map_err(store_error_response)?;
    Ok(ok_data(customers))
}

pub(crate) async fn jobs_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<DataResponse<Vec<Job>>, ApiErrorTuple> {
    let status = status
        .parse::<JobStatus>()
        .map_err(|error| validation_error("status", &error.to_string()))?;
    let jobs = queries::jobs_by_status(&state.store, status)
        .await
        .map_err(store_error_response)?;
    Ok(ok_data(jobs))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebhookEventsQuery {
    webhook_id: Option<String>,
}

pub(crate) async fn webhook_events(
    State(state): State<AppState>,
    Query(query): Query<WebhookEventsQuery>,
) -> Result<DataResponse<Vec<WebhookEvent>>, ApiErrorTuple> {
    let webhook_id = query.webhook_id.filter(|id| !id.trim().is_empty());
    let events = queries::webhook_events(&state.store, webhook_id.as_deref())
        .await
        .map_err(store_error_response)?;
    Ok(ok_data(events))
}

pub(crate) async fn dashboard_stats(State(state): State<AppState>) -> DataResponse<DashboardStats> {
    ok_data(state.sync.dashboard_stats(Utc::now()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RealTimeRequest {
    enabled: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SyncStatus {
    real_time: bool,
    jobs: usize,
    customers: usize,
    estimates: usize,
    invoices: usize,
    webhooks: usize,
    api_keys: usize,
}

impl SyncStatus {
    fn of(state: &AppState) -> Self {
        let snapshot = state.sync.snapshot();
        Self {
            real_time: state.sync.is_real_time(),
            jobs: snapshot.jobs.len(),
            customers: snapshot.customers.len(),
            estimates: snapshot.estimates.len(),
            invoices: snapshot.invoices.len(),
            webhooks: snapshot.webhooks.len(),
            api_keys: snapshot.api_keys.len(),
        }
    }
}

pub(crate) async fn set_real_time(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<DataResponse<SyncStatus>, ApiErrorTuple> {
    let request = parse_json_body::<RealTimeRequest>(&body)?;
    state
        .sync
        .set_real_time_sync(request.enabled)
        .await
        .map_err(sync_error_response)?;
    Ok(ok_data(SyncStatus::of(&state)))
}

pub(crate) async fn refresh(
    State(state): State<AppState>,
) -> Result<DataResponse<SyncStatus>, ApiErrorTuple> {
    state
        .sync
        .refresh_data()
        .await
        .map_err(sync_error_response)?;
    Ok(ok_data(SyncStatus::of(&state)))
}

/// Records inserted per collection by the sample-data seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCounts {
    pub customers: usize,
    pub jobs: usize,
    pub estimates: usize,
    pub invoices: usize,
    pub webhooks: usize,
    pub api_keys: usize,
    pub ai_automations: usize,
    pub total: usize,
}

impl From<&SeedSummary> for SeedCounts {
    fn from(summary: &SeedSummary) -> Self {
        Self {
            customers: summary.customers.len(),
            jobs: summary.jobs.len(),
            estimates: summary.estimates.len(),
            invoices: summary.invoices.len(),
            webhooks: summary.webhooks.len(),
            api_keys: summary.api_keys.len(),
            ai_automations: summary.ai_automations.len(),
            total: summary.total(),
        }
    }
}

/// Seeds the store this service owns; live subscribers see the new records.
pub(crate) async fn seed(
    State(state): State<AppState>,
) -> Result<DataResponse<SeedCounts>, ApiErrorTuple> {
    let summary = seed_sample_data(&state.store, Utc::now())
        .await
        .map_err(store_error_response)?;
    Ok(created_data(SeedCounts::from(&summary)))
}
