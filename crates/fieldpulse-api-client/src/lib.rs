//! Client for the FieldPulse REST API.
//!
//! Every call is a single attempt; callers decide whether to retry.

use std::env;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fieldpulse_domain::records::{
    Asset, AssetStatus, Comment, CommentEntityType, Coordinates, Location, Subtask,
    SubtaskStatus, Team, Timesheet, User,
};
use fieldpulse_domain::{
    Customer, CustomerDraft, CustomerPatch, DashboardStats, Estimate, EstimateDraft,
    EstimatePatch, Invoice, InvoiceDraft, InvoicePatch, Job, JobDraft, JobPatch, Project,
    ProjectDraft, ProjectPatch,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://api.fieldpulse.com";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const FALLBACK_ERROR_MESSAGE: &str = "API request failed";

const LOG_TARGET: &str = "fieldpulse.api_client";

#[derive(Debug, Clone)]
pub struct FieldPulseClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl FieldPulseClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Reads `FIELDPULSE_BASE_URL` and `FIELDPULSE_API_KEY`.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("FIELDPULSE_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = env::var("FIELDPULSE_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self {
            base_url,
            api_key,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum FieldPulseClientError {
    #[error("fieldpulse_client_base_url_missing")]
    BaseUrlMissing,
    #[error("fieldpulse_client_invalid_path")]
    InvalidPath,
    #[error("fieldpulse_request_failed:{message}")]
    Request { message: String },
    #[error("fieldpulse_read_failed:{message}")]
    Read { message: String },
    #[error("fieldpulse_http_{status}:{message}")]
    Http { status: StatusCode, message: String },
    #[error("fieldpulse_json_decode_failed:{message}")]
    Decode { message: String },
}

impl FieldPulseClientError {
    /// The server's explanation for an HTTP failure, if this is one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Http { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of responses that carry no data, such as deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    #[serde(rename = "totalPages", alias = "total_pages")]
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    fn query(self) -> String {
        format!("page={}&limit={}", self.page.max(1), self.limit.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetInput {
    pub name: String,
    pub category_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    pub status: AssetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationInput {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtaskInput {
    pub job_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: SubtaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubtaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubtaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentInput {
    pub entity_type: CommentEntityType,
    pub entity_id: String,
    pub user_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimesheetInput {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimesheetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FieldPulseClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl FieldPulseClient {
    pub fn new(config: FieldPulseClientConfig) -> Result<Self, FieldPulseClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            api_key: config
                .api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            http: reqwest::Client::new(),
        })
    }

    /// Same client, authenticating with `api_key` instead of the configured key.
    #[must_use]
    pub fn with_api_key(&self, api_key: &str) -> Self {
        let mut client = self.clone();
        client.api_key = Some(api_key.trim().to_string()).filter(|key| !key.is_empty());
        client
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn collection_path(collection: &str, page: PageRequest) -> String {
        format!("/{}?{}", collection.trim_matches('/'), page.query())
    }

    #[must_use]
    pub fn record_path(collection: &str, id: &str) -> String {
        format!("/{}/{}", collection.trim_matches('/'), path_segment(id))
    }

    #[must_use]
    pub fn job_subtasks_path(job_id: &str) -> String {
        format!("/jobs/{}/subtasks", path_segment(job_id))
    }

    #[must_use]
    pub fn comments_path(entity_type: CommentEntityType, entity_id: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("entity_type", entity_type.as_str())
            .append_pair("entity_id", entity_id.trim())
            .finish();
        format!("/comments?{query}")
    }

    #[must_use]
    pub fn timesheets_path(page: PageRequest, user_id: Option<&str>) -> String {
        let base = Self::collection_path("timesheets", page);
        match user_id.map(str::trim).filter(|value| !value.is_empty()) {
            Some(user_id) => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("user_id", user_id)
                    .finish();
                format!("{base}&{query}")
            }
            None => base,
        }
    }

    #[must_use]
    pub fn dashboard_stats_path() -> &'static str {
        "/dashboard/stats"
    }

    // Customers

    pub async fn list_customers(
        &self,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Customer>, FieldPulseClientError> {
        self.get_json(&Self::collection_path("customers", page)).await
    }

    pub async fn get_customer(
        &self,
        id: &str,
    ) -> Result<ApiResponse<Customer>, FieldPulseClientError> {
        self.get_json(&Self::record_path("customers", id)).await
    }

    pub async fn create_customer(
        &self,
        draft: &CustomerDraft,
    ) -> Result<ApiResponse<Customer>, FieldPulseClientError> {
        self.post_json("/customers", draft).await
    }

    pub async fn update_customer(
        &self,
        id: &str,
        patch: &CustomerPatch,
    ) -> Result<ApiResponse<Customer>, FieldPulseClientError> {
        self.put_json(&Self::record_path("customers", id), patch)
            .await
    }

    pub async fn delete_customer(&self, id: &str) -> Result<ApiAck, FieldPulseClientError> {
        self.delete_json(&Self::record_path("customers", id)).await
    }

    // Jobs

    pub async fn list_jobs(
        &self,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Job>, FieldPulseClientError> {
        self.get_json(&Self::collection_path("jobs", page)).await
    }

    pub async fn get_job(&self, id: &str) -> Result<ApiResponse<Job>, FieldPulseClientError> {
        self.get_json(&Self::record_path("jobs", id)).await
    }

    pub async fn create_job(
        &self,
        draft: &JobDraft,
    ) -> Result<ApiResponse<Job>, FieldPulseClientError> {
        self.post_json("/jobs", draft).await
    }

    pub async fn update_job(
        &self,
        id: &str,
        patch: &JobPatch,
    ) -> Result<ApiResponse<Job>, FieldPulseClientError> {
        self.put_json(&Self::record_path("jobs", id), patch).await
    }

    pub async fn delete_job(&self, id: &str) -> Result<ApiAck, FieldPulseClientError> {
        self.delete_json(&Self::record_path("jobs", id)).await
    }

    // Estimates

    pub async fn list_estimates(
        &self,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Estimate>, FieldPulseClientError> {
        self.get_json(&Self::collection_path("estimates", page)).await
    }

    pub async fn get_estimate(
        &self,
        id: &str,
    ) -> Result<ApiResponse<Estimate>, FieldPulseClientError> {
        self.get_json(&Self::record_path("estimates", id)).await
    }

    pub async fn create_estimate(
        &self,
        draft: &EstimateDraft,
    ) -> Result<ApiResponse<Estimate>, FieldPulseClientError> {
        self.post_json("/estimates", draft).await
    }

    pub async fn update_estimate(
        &self,
        id: &str,
        patch: &EstimatePatch,
    ) -> Result<ApiResponse<Estimate>, FieldPulseClientError> {
        self.put_json(&Self::record_path("estimates", id), patch)
            .await
    }

    pub async fn delete_estimate(&self, id: &str) -> Result<ApiAck, FieldPulseClientError> {
        self.delete_json(&Self::record_path("estimates", id)).await
    }

    // Invoices (no delete endpoint)

    pub async fn list_invoices(
        &self,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Invoice>, FieldPulseClientError> {
        self.get_json(&Self::collection_path("invoices", page)).await
    }

    pub async fn get_invoice(
        &self,
        id: &str,
    ) -> Result<ApiResponse<Invoice>, FieldPulseClientError> {
        self.get_json(&Self::record_path("invoices", id)).await
    }

    pub async fn create_invoice(
        &self,
        draft: &InvoiceDraft,
    ) -> Result<ApiResponse<Invoice>, FieldPulseClientError> {
        self.post_json("/invoices", draft).await
    }

    pub async fn update_invoice(
        &self,
        id: &str,
        patch: &InvoicePatch,
    ) -> Result<ApiResponse<Invoice>, FieldPulseClientError> {
        self.put_json(&Self::record_path("invoices", id), patch)
            .await
    }

    // Projects

    pub async fn list_projects(
        &self,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Project>, FieldPulseClientError> {
        self.get_json(&Self::collection_path("projects", page)).await
    }

    pub async fn get_project(
        &self,
        id: &str,
    ) -> Result<ApiResponse<Project>, FieldPulseClientError> {
        self.get_json(&Self::record_path("projects", id)).await
    }

    pub async fn create_project(
        &self,
        draft: &ProjectDraft,
    ) -> Result<ApiResponse<Project>, FieldPulseClientError> {
        self.post_json("/projects", draft).await
    }

    pub async fn update_project(
        &self,
        id: &str,
        patch: &ProjectPatch,
    ) -> Result<ApiResponse<Project>, FieldPulseClientError> {
        self.put_json(&Self::record_path("projects", id), patch)
            .await
    }

    pub async fn delete_project(&self, id: &str) -> Result<ApiAck, FieldPulseClientError> {
        self.delete_json(&Self::record_path("projects", id)).await
    }

    // Users and teams

    pub async fn list_users(&self) -> Result<ApiResponse<Vec<User>>, FieldPulseClientError> {
        self.get_json("/users").await
    }

    pub async fn get_user(&self, id: &str) -> Result<ApiResponse<User>, FieldPulseClientError> {
        self.get_json(&Self::record_path("users", id)).await
    }

    pub async fn list_teams(&self) -> Result<ApiResponse<Vec<Team>>, FieldPulseClientError> {
        self.get_json("/teams").await
    }

    // Assets and locations

    pub async fn list_assets(
        &self,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Asset>, FieldPulseClientError> {
        self.get_json(&Self::collection_path("assets", page)).await
    }

    pub async fn create_asset(
        &self,
        input: &AssetInput,
    ) -> Result<ApiResponse<Asset>, FieldPulseClientError> {
        self.post_json("/assets", input).await
    }

    pub async fn list_locations(
        &self,
        page: PageRequest,
    ) -> Result<PaginatedResponse<Location>, FieldPulseClientError> {
        self.get_json(&Self::collection_path("locations", page)).await
    }

    pub async fn create_location(
        &self,
        input: &LocationInput,
    ) -> Result<ApiResponse<Location>, FieldPulseClientError> {
        self.post_json("/locations", input).await
    }

    // Subtasks

    pub async fn job_subtasks(
        &self,
        job_id: &str,
    ) -> Result<ApiResponse<Vec<Subtask>>, FieldPulseClientError> {
        self.get_json(&Self::job_subtasks_path(job_id)).await
    }

    pub async fn create_subtask(
        &self,
        input: &SubtaskInput,
    ) -> Result<ApiResponse<Subtask>, FieldPulseClientError> {
        self.post_json("/subtasks", input).await
    }

    pub async fn update_subtask(
        &self,
        id: &str,
        update: &SubtaskUpdate,
    ) -> Result<ApiResponse<Subtask>, FieldPulseClientError> {
        self.put_json(&Self::record_path("subtasks", id), update)
            .await
    }

    // Comments

    pub async fn comments(
        &self,
        entity_type: CommentEntityType,
        entity_id: &str,
    ) -> Result<ApiResponse<Vec<Comment>>, FieldPulseClientError> {
        self.get_json(&Self::comments_path(entity_type, entity_id))
            .await
    }

    pub async fn create_comment(
        &self,
        input: &CommentInput,
    ) -> Result<ApiResponse<Comment>, FieldPulseClientError> {
        self.post_json("/comments", input).await
    }

    // Timesheets

    pub async fn list_timesheets(
        &self,
        page: PageRequest,
        user_id: Option<&str>,
    ) -> Result<PaginatedResponse<Timesheet>, FieldPulseClientError> {
        self.get_json(&Self::timesheets_path(page, user_id)).await
    }

    pub async fn create_timesheet(
        &self,
        input: &TimesheetInput,
    ) -> Result<ApiResponse<Timesheet>, FieldPulseClientError> {
        self.post_json("/timesheets", input).await
    }

    pub async fn update_timesheet(
        &self,
        id: &str,
        update: &TimesheetUpdate,
    ) -> Result<ApiResponse<Timesheet>, FieldPulseClientError> {
        self.put_json(&Self::record_path("timesheets", id), update)
            .await
    }

    pub async fn dashboard_stats(
        &self,
    ) -> Result<ApiResponse<DashboardStats>, FieldPulseClientError> {
        self.get_json(Self::dashboard_stats_path()).await
    }

    // Transport

    pub async fn get_json<T>(&self, path: &str) -> Result<T, FieldPulseClientError>
    where
        T: DeserializeOwned,
    {
        self.send::<(), T>(Method::GET, path, None).await
    }

    pub async fn post_json<Req, Res>(
        &self,
        path: &str,
        payload: &Req,
    ) -> Result<Res, FieldPulseClientError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.send(Method::POST, path, Some(payload)).await
    }

    pub async fn put_json<Req, Res>(
        &self,
        path: &str,
        payload: &Req,
    ) -> Result<Res, FieldPulseClientError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.send(Method::PUT, path, Some(payload)).await
    }

    pub async fn delete_json<T>(&self, path: &str) -> Result<T, FieldPulseClientError>
    where
        T: DeserializeOwned,
    {
        self.send::<(), T>(Method::DELETE, path, None).await
    }

    async fn send<Req, Res>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Req>,
    ) -> Result<Res, FieldPulseClientError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self
            .endpoint(path)
            .ok_or(FieldPulseClientError::InvalidPath)?;

        tracing::info!(target: LOG_TARGET, method = %method, path, "fieldpulse api request");

        let mut request = self
            .http
            .request(method.clone(), url.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout);
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.bearer_auth(api_key);
        }
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|error| {
            tracing::error!(
                target: LOG_TARGET,
                method = %method,
                path,
                error = %error,
                "fieldpulse api request failed",
            );
            FieldPulseClientError::Request {
                message: error.to_string(),
            }
        })?;

        decode_json_response(response)
            .await
            .inspect_err(|error| {
                tracing::error!(
                    target: LOG_TARGET,
                    method = %method,
                    path,
                    error = %error,
                    "fieldpulse api error response",
                );
            })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
}

/// Maps a non-success response to an error carrying the server's `message`,
/// or a generic message when the body has none.
pub fn format_http_error(status: StatusCode, body: &[u8]) -> FieldPulseClientError {
    let message = serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
    FieldPulseClientError::Http { status, message }
}

/// Percent-encodes one path segment. `byte_serialize` writes spaces as `+`,
/// which only means a space inside a query string.
fn path_segment(value: &str) -> String {
    form_urlencoded::byte_serialize(value.trim().as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn normalize_base_url(base_url: &str) -> Result<String, FieldPulseClientError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(FieldPulseClientError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, FieldPulseClientError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| FieldPulseClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| FieldPulseClientError::Decode {
        message: error.to_string(),
    })
}
