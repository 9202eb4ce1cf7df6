//! Create and partial-update inputs for each stored entity.
//!
//! Patches serialize only the fields that are set, so a store merge never
//! touches a field the caller did not name.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{AiAutomationConfig, AiAutomationStats};
use crate::status::{
    ApiKeyService, AutomationKind, EstimateStatus, InvoiceStatus, JobStatus, Priority,
    ProjectStatus, WebhookEventStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require_text(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "value is required"));
    }
    Ok(())
}

fn require_optional_text(value: Option<&str>, field: &'static str) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |value| require_text(value, field))
}

fn require_amount(value: f64, field: &'static str) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::new(
            field,
            "amount must be a non-negative number",
        ));
    }
    Ok(())
}

fn require_url(value: &str, field: &'static str) -> Result<(), ValidationError> {
    require_text(value, field)?;
    let trimmed = value.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ValidationError::new(
            field,
            "url must use http:// or https://",
        ));
    }
    Ok(())
}

fn require_event_names(events: &[String], field: &'static str) -> Result<(), ValidationError> {
    if events.iter().any(|event| event.trim().is_empty()) {
        return Err(ValidationError::new(field, "event names must not be empty"));
    }
    Ok(())
}

fn require_non_empty_patch<T: Serialize>(patch: &T) -> Result<(), ValidationError> {
    let is_empty = match serde_json::to_value(patch) {
        Ok(Value::Object(fields)) => fields.is_empty(),
        _ => true,
    };
    if is_empty {
        return Err(ValidationError::new("patch", "patch contains no fields"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

impl CustomerDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Validate for CustomerDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.name, "name")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

impl Validate for CustomerPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)?;
        require_optional_text(self.name.as_deref(), "name")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDraft {
    pub customer_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl JobDraft {
    pub fn new(customer_id: impl Into<String>, title: impl Into<String>, status: JobStatus) -> Self {
        Self {
            customer_id: customer_id.into(),
            title: title.into(),
            description: None,
            status,
            priority: Priority::default(),
            scheduled_date: None,
            completed_date: None,
            assigned_to: None,
            location: None,
        }
    }
}

impl Validate for JobDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.customer_id, "customer_id")?;
        require_text(&self.title, "title")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl Validate for JobPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)?;
        require_optional_text(self.customer_id.as_deref(), "customer_id")?;
        require_optional_text(self.title.as_deref(), "title")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateDraft {
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub total_amount: f64,
    pub status: EstimateStatus,
}

impl Validate for EstimateDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.customer_id, "customer_id")?;
        require_text(&self.title, "title")?;
        require_amount(self.total_amount, "total_amount")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EstimateStatus>,
}

impl Validate for EstimatePatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)?;
        require_optional_text(self.customer_id.as_deref(), "customer_id")?;
        require_optional_text(self.title.as_deref(), "title")?;
        self.total_amount
            .map_or(Ok(()), |amount| require_amount(amount, "total_amount"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub invoice_number: String,
    pub total_amount: f64,
    pub status: InvoiceStatus,
    pub due_date: DateTime<Utc>,
}

impl Validate for InvoiceDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.customer_id, "customer_id")?;
        require_text(&self.invoice_number, "invoice_number")?;
        require_amount(self.total_amount, "total_amount")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoicePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InvoiceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl Validate for InvoicePatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)?;
        require_optional_text(self.customer_id.as_deref(), "customer_id")?;
        require_optional_text(self.invoice_number.as_deref(), "invoice_number")?;
        self.total_amount
            .map_or(Ok(()), |amount| require_amount(amount, "total_amount"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDraft {
    pub customer_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl Validate for ProjectDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.customer_id, "customer_id")?;
        require_text(&self.name, "name")?;
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if end < start => Err(ValidationError::new(
                "end_date",
                "end date must not precede start date",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl Validate for ProjectPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)?;
        require_optional_text(self.name.as_deref(), "name")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDraft {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Validate for WebhookDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.name, "name")?;
        require_url(&self.url, "url")?;
        require_event_names(&self.events, "events")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Validate for WebhookPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)?;
        require_optional_text(self.name.as_deref(), "name")?;
        if let Some(url) = self.url.as_deref() {
            require_url(url, "url")?;
        }
        self.events
            .as_deref()
            .map_or(Ok(()), |events| require_event_names(events, "events"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyDraft {
    pub name: String,
    pub service: ApiKeyService,
    pub key: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

impl Validate for ApiKeyDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.name, "name")?;
        require_text(&self.key, "key")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ApiKeyService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl Validate for ApiKeyPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)?;
        require_optional_text(self.name.as_deref(), "name")?;
        require_optional_text(self.key.as_deref(), "key")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventDraft {
    pub webhook_id: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    pub status: WebhookEventStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validate for WebhookEventDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.webhook_id, "webhook_id")?;
        require_text(&self.event, "event")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WebhookEventStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validate for WebhookEventPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAutomationDraft {
    pub name: String,
    pub kind: AutomationKind,
    pub description: String,
    pub is_active: bool,
    #[serde(default)]
    pub config: AiAutomationConfig,
    #[serde(default)]
    pub stats: AiAutomationStats,
}

impl Validate for AiAutomationDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.name, "name")?;
        if !(0.0..=100.0).contains(&self.stats.success_rate) {
            return Err(ValidationError::new(
                "stats.success_rate",
                "success rate must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiAutomationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AiAutomationConfig>,
}

impl Validate for AiAutomationPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty_patch(self)?;
        require_optional_text(self.name.as_deref(), "name")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = JobPatch::status(JobStatus::InProgress);
        let encoded = serde_json::to_value(&patch).expect("encode patch");
        assert_eq!(encoded, json!({"status": "in_progress"}));
    }

    #[test]
    fn empty_patch_is_rejected() {
        let error = CustomerPatch::default()
            .validate()
            .expect_err("empty patch rejected");
        assert_eq!(error.field, "patch");
    }

    #[test]
    fn drafts_require_trimmed_text() {
        let error = CustomerDraft::named("   ")
            .validate()
            .expect_err("blank name rejected");
        assert_eq!(error, ValidationError::new("name", "value is required"));

        assert!(CustomerDraft::named("Ada Lovelace").validate().is_ok());
        assert!(
            JobDraft::new("c1", "Install Panel", JobStatus::Scheduled)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn amounts_must_be_finite_and_non_negative() {
        let mut draft = EstimateDraft {
            customer_id: "c1".to_string(),
            job_id: None,
            title: "Panel upgrade".to_string(),
            description: None,
            total_amount: -1.0,
            status: EstimateStatus::Draft,
        };
        assert_eq!(
            draft.validate().map_err(|error| error.field),
            Err("total_amount")
        );
        draft.total_amount = f64::NAN;
        assert!(draft.validate().is_err());
        draft.total_amount = 250.0;
        assert!(draft.validate().is_ok());

        let patch = InvoicePatch {
            total_amount: Some(f64::INFINITY),
            ..InvoicePatch::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn webhook_urls_and_events_are_checked() {
        let mut draft = WebhookDraft {
            name: "Slack".to_string(),
            url: "ftp://hooks.example.com".to_string(),
            events: vec!["job.created".to_string()],
            secret: None,
            is_active: true,
            headers: BTreeMap::new(),
            description: None,
        };
        assert_eq!(draft.validate().map_err(|error| error.field), Err("url"));

        draft.url = "https://hooks.example.com/in".to_string();
        draft.events.push(" ".to_string());
        assert_eq!(draft.validate().map_err(|error| error.field), Err("events"));

        draft.events.pop();
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn webhook_draft_defaults_to_active() {
        let draft: WebhookDraft = serde_json::from_value(json!({
            "name": "Slack",
            "url": "https://hooks.example.com/in",
        }))
        .expect("decode draft");
        assert!(draft.is_active);
        assert!(draft.events.is_empty());
    }
}
