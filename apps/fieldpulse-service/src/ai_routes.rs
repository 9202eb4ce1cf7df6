use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use fieldpulse_ai::{
    AiError, CustomerContext, EquipmentReport, GeneratedEstimate, JobAnalysis, MaintenancePrediction,
    ScheduleOptimization, Technician,
};
use fieldpulse_domain::{AiAutomation, Customer, Entity, Job, JobStatus};
use fieldpulse_store::Repository;
use serde::{Deserialize, Serialize};

use crate::api_envelope::{ApiDataEnvelope, ApiErrorTuple, not_found_error, ok_data};
use crate::{AppState, ai_error_response, parse_json_body, store_error_response};

type DataResponse<T> = (StatusCode, Json<ApiDataEnvelope<T>>);

async fn load<E: Entity>(state: &AppState, id: &str) -> Result<E, ApiErrorTuple> {
    Repository::<E>::new(Arc::clone(&state.store))
        .get(id)
        .await
        .map_err(store_error_response)?
        .ok_or_else(|| not_found_error(format!("{} record '{id}' was not found", E::COLLECTION)))
}

/// Routes that read records first fail on a missing credential before any lookup.
fn require_ai(state: &AppState) -> Result<(), ApiErrorTuple> {
    if state.ai.is_configured() {
        Ok(())
    } else {
        Err(ai_error_response(AiError::NotConfigured))
    }
}

pub(crate) async fn automations(
    State(state): State<AppState>,
) -> Result<DataResponse<Vec<AiAutomation>>, ApiErrorTuple> {
    let automations = Repository::<AiAutomation>::new(Arc::clone(&state.store))
        .list(None)
        .await
        .map_err(store_error_response)?;
    Ok(ok_data(automations))
}

pub(crate) async fn analyze_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<DataResponse<JobAnalysis>, ApiErrorTuple> {
    require_ai(&state)?;
    let job = load::<Job>(&state, &id).await?;
    let analysis = state
        .ai
        .analyze_job(&job)
        .await
        .map_err(ai_error_response)?;
    Ok(ok_data(analysis))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EstimateRequest {
    job_description: String,
    customer_id: String,
}

pub(crate) async fn generate_estimate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<DataResponse<GeneratedEstimate>, ApiErrorTuple> {
    require_ai(&state)?;
    let request = parse_json_body::<EstimateRequest>(&body)?;
    let customer = load::<Customer>(&state, &request.customer_id).await?;
    let estimate = state
        .ai
        .generate_estimate(&request.job_description, &customer)
        .await
        .map_err(ai_error_response)?;
    Ok(ok_data(estimate))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CustomerResponseRequest {
    query: String,
    #[serde(default)]
    context: CustomerContext,
}

#[derive(Debug, Serialize)]
pub(crate) struct CustomerResponse {
    response: String,
}

pub(crate) async fn customer_response(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<DataResponse<CustomerResponse>, ApiErrorTuple> {
    let request = parse_json_body::<CustomerResponseRequest>(&body)?;
    let response = state
        .ai
        .generate_customer_response(&request.query, &request.context)
        .await
        .map_err(ai_error_response)?;
    Ok(ok_data(CustomerResponse { response }))
}

pub(crate) async fn predict_maintenance(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<DataResponse<MaintenancePrediction>, ApiErrorTuple> {
    let report = parse_json_body::<EquipmentReport>(&body)?;
    let prediction = state
        .ai
        .predict_maintenance(&report)
        .await
        .map_err(ai_error_response)?;
    Ok(ok_data(prediction))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScheduleRequest {
    /// Defaults to every cached scheduled job.
    #[serde(default)]
    job_ids: Option<Vec<String>>,
    technicians: Vec<Technician>,
}

pub(crate) async fn optimize_schedule(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<DataResponse<ScheduleOptimization>, ApiErrorTuple> {
    require_ai(&state)?;
    let request = parse_json_body::<ScheduleRequest>(&body)?;
    let jobs = match request.job_ids {
        Some(ids) => {
            let mut jobs = Vec::with_capacity(ids.len());
            for id in &ids {
                jobs.push(load::<Job>(&state, id).await?);
            }
            jobs
        }
        None => state
            .sync
            .jobs()
            .into_iter()
            .filter(|job| job.status == JobStatus::Scheduled)
            .collect(),
    };
    let schedule = state
        .ai
        .optimize_schedule(&jobs, &request.technicians)
        .await
        .map_err(ai_error_response)?;
    Ok(ok_data(schedule))
}
