//! Read helpers layered on the typed repositories.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fieldpulse_domain::{
    Customer, DashboardStats, Estimate, Invoice, Job, JobStatus, WebhookEvent,
};

use crate::{DocumentStore, Filter, Repository, StoreError};

/// Number of deliveries returned when no webhook is named.
pub const RECENT_WEBHOOK_EVENTS: usize = 100;

pub async fn jobs_by_status(
    store: &Arc<dyn DocumentStore>,
    status: JobStatus,
) -> Result<Vec<Job>, StoreError> {
    Repository::<Job>::new(Arc::clone(store))
        .query(&Filter::eq("status", status.as_str()))
        .await
}

fn contains_term(value: Option<&str>, needle: &str) -> bool {
    value.is_some_and(|value| value.to_lowercase().contains(needle))
}

/// Case-insensitive substring match on title or description.
pub async fn search_jobs(
    store: &Arc<dyn DocumentStore>,
    term: &str,
) -> Result<Vec<Job>, StoreError> {
    let needle = term.trim().to_lowercase();
    let jobs = Repository::<Job>::new(Arc::clone(store)).list(None).await?;
    Ok(jobs
        .into_iter()
        .filter(|job| {
            contains_term(Some(&job.title), &needle)
                || contains_term(job.description.as_deref(), &needle)
        })
        .collect())
}

/// Case-insensitive substring match on name or email.
pub async fn search_customers(
    store: &Arc<dyn DocumentStore>,
    term: &str,
) -> Result<Vec<Customer>, StoreError> {
    let needle = term.trim().to_lowercase();
    let customers = Repository::<Customer>::new(Arc::clone(store))
        .list(None)
        .await?;
    Ok(customers
        .into_iter()
        .filter(|customer| {
            contains_term(Some(&customer.name), &needle)
                || contains_term(customer.email.as_deref(), &needle)
        })
        .collect())
}

pub async fn dashboard_stats(
    store: &Arc<dyn DocumentStore>,
    now: DateTime<Utc>,
) -> Result<DashboardStats, StoreError> {
    let customers = Repository::<Customer>::new(Arc::clone(store))
        .list(None)
        .await?;
    let jobs = Repository::<Job>::new(Arc::clone(store)).list(None).await?;
    let estimates = Repository::<Estimate>::new(Arc::clone(store))
        .list(None)
        .await?;
    let invoices = Repository::<Invoice>::new(Arc::clone(store))
        .list(None)
        .await?;
    Ok(DashboardStats::compute(
        &customers, &jobs, &estimates, &invoices, now,
    ))
}

/// Deliveries for one webhook, or the most recent deliveries overall.
pub async fn webhook_events(
    store: &Arc<dyn DocumentStore>,
    webhook_id: Option<&str>,
) -> Result<Vec<WebhookEvent>, StoreError> {
    let events = Repository::<WebhookEvent>::new(Arc::clone(store));
    match webhook_id {
        Some(webhook_id) => events.query(&Filter::eq("webhook_id", webhook_id)).await,
        None => events.list(Some(RECENT_WEBHOOK_EVENTS)).await,
    }
}
