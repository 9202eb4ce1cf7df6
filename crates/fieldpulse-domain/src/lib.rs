//! Shared domain model for the FieldPulse workspace: entity records, status enums,
//! create/update inputs with validation, collection names, dashboard stats and sample data.

pub mod collection;
pub mod entities;
pub mod format;
pub mod patch;
pub mod records;
pub mod schema;
pub mod seed;
pub mod stats;
pub mod status;

pub use collection::{Collection, UnknownCollection};
pub use entities::{
    AiAutomation, AiAutomationConfig, AiAutomationStats, ApiKey, Customer, Estimate, Invoice, Job,
    Project, REDACTED_SECRET, Webhook, WebhookEvent,
};
pub use patch::{
    AiAutomationDraft, AiAutomationPatch, ApiKeyDraft, ApiKeyPatch, CustomerDraft, CustomerPatch,
    EstimateDraft, EstimatePatch, InvoiceDraft, InvoicePatch, JobDraft, JobPatch, ProjectDraft,
    ProjectPatch, Validate, ValidationError, WebhookDraft, WebhookEventDraft, WebhookEventPatch,
    WebhookPatch,
};
pub use stats::{COMPLETION_RATE_PERCENT, DashboardStats};
pub use status::{
    ApiKeyService, AutomationKind, EstimateStatus, InvoiceStatus, JobStatus, Priority,
    ProjectStatus, UnknownStatus, WebhookEventStatus,
};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A record type stored in one document collection.
///
/// `Draft` is the create input and `Patch` the partial update input; both are
/// validated before they reach a store.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    type Draft: Serialize + Validate + Send + Sync;
    type Patch: Serialize + Validate + Send + Sync;

    fn id(&self) -> &str;
}

macro_rules! impl_entity {
    ($entity:ty, $collection:expr, $draft:ty, $patch:ty) => {
        impl Entity for $entity {
            const COLLECTION: Collection = $collection;

            type Draft = $draft;
            type Patch = $patch;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

impl_entity!(Customer, Collection::Customers, CustomerDraft, CustomerPatch);
impl_entity!(Job, Collection::Jobs, JobDraft, JobPatch);
impl_entity!(Estimate, Collection::Estimates, EstimateDraft, EstimatePatch);
impl_entity!(Invoice, Collection::Invoices, InvoiceDraft, InvoicePatch);
impl_entity!(Project, Collection::Projects, ProjectDraft, ProjectPatch);
impl_entity!(Webhook, Collection::Webhooks, WebhookDraft, WebhookPatch);
impl_entity!(ApiKey, Collection::ApiKeys, ApiKeyDraft, ApiKeyPatch);
impl_entity!(
    WebhookEvent,
    Collection::WebhookEvents,
    WebhookEventDraft,
    WebhookEventPatch
);
impl_entity!(
    AiAutomation,
    Collection::AiAutomations,
    AiAutomationDraft,
    AiAutomationPatch
);
