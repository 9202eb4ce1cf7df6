//! Sample records used to initialize an empty store.
//!
//! Dependent records are built from the ids the store assigned to the records
//! they reference, so seeded jobs, estimates and invoices point at real customers.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::entities::{AiAutomationConfig, AiAutomationStats};
use crate::patch::{
    AiAutomationDraft, ApiKeyDraft, CustomerDraft, EstimateDraft, InvoiceDraft, JobDraft,
    WebhookDraft,
};
use crate::status::{
    ApiKeyService, AutomationKind, EstimateStatus, InvoiceStatus, JobStatus, Priority,
};

/// A draft plus the creation time it should be stored with.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord<T> {
    pub draft: T,
    pub created_at: DateTime<Utc>,
}

impl<T> SampleRecord<T> {
    fn at(draft: T, created_at: DateTime<Utc>) -> Self {
        Self { draft, created_at }
    }
}

fn reference(ids: &[String], index: usize, prefix: &str) -> String {
    ids.get(index)
        .cloned()
        .unwrap_or_else(|| format!("{prefix}_{}", index + 1))
}

fn customer(name: &str, email: &str, phone: &str, address: &str, zip: &str) -> CustomerDraft {
    CustomerDraft {
        name: name.to_string(),
        email: Some(email.to_string()),
        phone: Some(phone.to_string()),
        address: Some(address.to_string()),
        city: Some("Springfield".to_string()),
        state: Some("IL".to_string()),
        zip: Some(zip.to_string()),
    }
}

pub fn sample_customers(now: DateTime<Utc>) -> Vec<SampleRecord<CustomerDraft>> {
    [
        customer(
            "John Smith",
            "john.smith@email.com",
            "(555) 123-4567",
            "123 Main St",
            "62701",
        ),
        customer(
            "Sarah Johnson",
            "sarah.johnson@email.com",
            "(555) 987-6543",
            "456 Oak Ave",
            "62702",
        ),
        customer(
            "Mike Wilson",
            "mike.wilson@email.com",
            "(555) 555-0123",
            "789 Pine St",
            "62703",
        ),
    ]
    .into_iter()
    .map(|draft| SampleRecord::at(draft, now))
    .collect()
}

pub fn sample_jobs(customer_ids: &[String], now: DateTime<Utc>) -> Vec<SampleRecord<JobDraft>> {
    let hvac = JobDraft {
        description: Some("Install new HVAC system in residential home".to_string()),
        priority: Priority::High,
        scheduled_date: Some(now + Duration::days(1)),
        assigned_to: Some("tech_1".to_string()),
        location: Some("123 Main St, Springfield, IL".to_string()),
        ..JobDraft::new(
            reference(customer_ids, 0, "customer"),
            "HVAC System Installation",
            JobStatus::InProgress,
        )
    };
    let plumbing = JobDraft {
        description: Some("Fix leaking pipes in basement".to_string()),
        priority: Priority::Medium,
        scheduled_date: Some(now + Duration::days(2)),
        assigned_to: Some("tech_2".to_string()),
        location: Some("456 Oak Ave, Springfield, IL".to_string()),
        ..JobDraft::new(
            reference(customer_ids, 1, "customer"),
            "Plumbing Repair",
            JobStatus::Scheduled,
        )
    };
    let inspection = JobDraft {
        description: Some("Annual electrical system inspection".to_string()),
        priority: Priority::Low,
        scheduled_date: Some(now - Duration::days(1)),
        completed_date: Some(now),
        assigned_to: Some("tech_3".to_string()),
        location: Some("789 Pine St, Springfield, IL".to_string()),
        ..JobDraft::new(
            reference(customer_ids, 2, "customer"),
            "Electrical Inspection",
            JobStatus::Completed,
        )
    };

    vec![
        SampleRecord::at(hvac, now),
        SampleRecord::at(plumbing, now),
        SampleRecord::at(inspection, now - Duration::days(2)),
    ]
}

pub fn sample_estimates(
    customer_ids: &[String],
    now: DateTime<Utc>,
) -> Vec<SampleRecord<EstimateDraft>> {
    vec![
        SampleRecord::at(
            EstimateDraft {
                customer_id: reference(customer_ids, 0, "customer"),
                job_id: None,
                title: "HVAC System Estimate".to_string(),
                description: Some("Complete HVAC system replacement".to_string()),
                total_amount: 8500.0,
                status: EstimateStatus::Sent,
            },
            now,
        ),
        SampleRecord::at(
            EstimateDraft {
                customer_id: reference(customer_ids, 1, "customer"),
                job_id: None,
                title: "Bathroom Renovation Estimate".to_string(),
                description: Some("Full bathroom renovation including plumbing".to_string()),
                total_amount: 12000.0,
                status: EstimateStatus::Approved,
            },
            now,
        ),
    ]
}

pub fn sample_invoices(
    customer_ids: &[String],
    job_ids: &[String],
    now: DateTime<Utc>,
) -> Vec<SampleRecord<InvoiceDraft>> {
    vec![
        SampleRecord::at(
            InvoiceDraft {
                customer_id: reference(customer_ids, 2, "customer"),
                job_id: Some(reference(job_ids, 2, "job")),
                invoice_number: "INV-2024-001".to_string(),
                total_amount: 350.0,
                status: InvoiceStatus::Paid,
                due_date: now + Duration::days(30),
            },
            now,
        ),
        SampleRecord::at(
            InvoiceDraft {
                customer_id: reference(customer_ids, 0, "customer"),
                job_id: None,
                invoice_number: "INV-2024-002".to_string(),
                total_amount: 1250.0,
                status: InvoiceStatus::Sent,
                due_date: now + Duration::days(15),
            },
            now,
        ),
    ]
}

fn events(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

pub fn sample_webhooks(now: DateTime<Utc>) -> Vec<SampleRecord<WebhookDraft>> {
    vec![
        SampleRecord::at(
            WebhookDraft {
                name: "Job Status Updates".to_string(),
                url: "https://api.example.com/webhooks/job-status".to_string(),
                events: events(&["job.created", "job.updated", "job.completed"]),
                secret: Some("webhook_secret_123".to_string()),
                is_active: true,
                headers: BTreeMap::new(),
                description: Some("Webhook for job status change notifications".to_string()),
            },
            now,
        ),
        SampleRecord::at(
            WebhookDraft {
                name: "Customer Notifications".to_string(),
                url: "https://notifications.example.com/customer-updates".to_string(),
                events: events(&["customer.created", "estimate.sent", "invoice.sent"]),
                secret: None,
                is_active: true,
                headers: BTreeMap::new(),
                description: Some("Customer notification webhook".to_string()),
            },
            now,
        ),
    ]
}

pub fn sample_api_keys(now: DateTime<Utc>) -> Vec<SampleRecord<ApiKeyDraft>> {
    vec![
        SampleRecord::at(
            ApiKeyDraft {
                name: "OpenAI Integration".to_string(),
                service: ApiKeyService::Openai,
                key: "sk-...".to_string(),
                is_active: true,
                description: Some("API key for OpenAI AI automations".to_string()),
                permissions: events(&["chat", "completion", "embedding"]),
            },
            now,
        ),
        SampleRecord::at(
            ApiKeyDraft {
                name: "Google Maps API".to_string(),
                service: ApiKeyService::Google,
                key: "AIza...".to_string(),
                is_active: true,
                description: Some("Google Maps API for location services".to_string()),
                permissions: events(&["geocoding", "directions"]),
            },
            now,
        ),
    ]
}

pub fn sample_automations(now: DateTime<Utc>) -> Vec<SampleRecord<AiAutomationDraft>> {
    vec![
        SampleRecord::at(
            AiAutomationDraft {
                name: "Smart Job Scheduling".to_string(),
                kind: AutomationKind::Langchain,
                description:
                    "Automatically schedule jobs based on technician availability and location"
                        .to_string(),
                is_active: true,
                config: AiAutomationConfig {
                    model: Some("gpt-4".to_string()),
                    temperature: Some(0.3),
                    triggers: events(&["job.created", "technician.available"]),
                    ..AiAutomationConfig::default()
                },
                stats: AiAutomationStats {
                    total_runs: 156,
                    success_rate: 94.0,
                    last_run: Some(now),
                    avg_processing_time: Some(2.3),
                },
            },
            now,
        ),
        SampleRecord::at(
            AiAutomationDraft {
                name: "Customer Query Assistant".to_string(),
                kind: AutomationKind::Openai,
                description: "AI-powered customer support chatbot".to_string(),
                is_active: true,
                config: AiAutomationConfig {
                    model: Some("gpt-3.5-turbo".to_string()),
                    temperature: Some(0.7),
                    max_tokens: Some(500),
                    ..AiAutomationConfig::default()
                },
                stats: AiAutomationStats {
                    total_runs: 342,
                    success_rate: 89.0,
                    last_run: Some(now),
                    avg_processing_time: Some(1.8),
                },
            },
            now,
        ),
        SampleRecord::at(
            AiAutomationDraft {
                name: "Document Intelligence".to_string(),
                kind: AutomationKind::Llamaindex,
                description: "Extract and analyze information from service documents"
                    .to_string(),
                is_active: true,
                config: AiAutomationConfig {
                    temperature: Some(0.2),
                    triggers: events(&["document.uploaded"]),
                    ..AiAutomationConfig::default()
                },
                stats: AiAutomationStats {
                    total_runs: 78,
                    success_rate: 96.0,
                    last_run: Some(now - Duration::hours(1)),
                    avg_processing_time: Some(5.2),
                },
            },
            now,
        ),
    ]
}
