//! Schema initializer: fills an empty store with the sample dataset.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use fieldpulse_domain::seed::{self, SampleRecord};
use fieldpulse_domain::{Collection, Validate, ValidationError, schema};
use serde::Serialize;
use serde_json::Value;

use crate::{DocumentStore, FIELD_CREATED_AT, StoreError, to_document};

/// Ids assigned to the seeded records, per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub customers: Vec<String>,
    pub jobs: Vec<String>,
    pub estimates: Vec<String>,
    pub invoices: Vec<String>,
    pub webhooks: Vec<String>,
    pub api_keys: Vec<String>,
    pub ai_automations: Vec<String>,
}

impl SeedSummary {
    pub fn total(&self) -> usize {
        self.customers.len()
            + self.jobs.len()
            + self.estimates.len()
            + self.invoices.len()
            + self.webhooks.len()
            + self.api_keys.len()
            + self.ai_automations.len()
    }
}

async fn insert_all<T, F>(
    store: &Arc<dyn DocumentStore>,
    collection: Collection,
    records: Vec<SampleRecord<T>>,
    check: F,
) -> Result<Vec<String>, StoreError>
where
    T: Serialize + Validate,
    F: Fn(&T) -> Result<(), ValidationError>,
{
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        check(&record.draft)?;
        record.draft.validate()?;
        let mut document = to_document(&record.draft)?;
        document.insert(
            FIELD_CREATED_AT.to_string(),
            Value::String(
                record
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
        );
        ids.push(store.create(collection, document).await?);
    }
    tracing::info!(
        target: "fieldpulse.store",
        collection = %collection,
        count = ids.len(),
        "seeded sample records",
    );
    Ok(ids)
}

fn no_schema<T>(_draft: &T) -> Result<(), ValidationError> {
    Ok(())
}

/// Inserts the sample dataset. Dependent records reference the ids assigned to
/// the customers and jobs seeded before them.
pub async fn seed_sample_data(
    store: &Arc<dyn DocumentStore>,
    now: DateTime<Utc>,
) -> Result<SeedSummary, StoreError> {
    let customers = insert_all(
        store,
        Collection::Customers,
        seed::sample_customers(now),
        schema::validate_customer,
    )
    .await?;
    let jobs = insert_all(
        store,
        Collection::Jobs,
        seed::sample_jobs(&customers, now),
        schema::validate_job,
    )
    .await?;
    let estimates = insert_all(
        store,
        Collection::Estimates,
        seed::sample_estimates(&customers, now),
        schema::validate_estimate,
    )
    .await?;
    let invoices = insert_all(
        store,
        Collection::Invoices,
        seed::sample_invoices(&customers, &jobs, now),
        schema::validate_invoice,
    )
    .await?;
    let webhooks = insert_all(
        store,
        Collection::Webhooks,
        seed::sample_webhooks(now),
        no_schema,
    )
    .await?;
    let api_keys = insert_all(
        store,
        Collection::ApiKeys,
        seed::sample_api_keys(now),
        no_schema,
    )
    .await?;
    let ai_automations = insert_all(
        store,
        Collection::AiAutomations,
        seed::sample_automations(now),
        no_schema,
    )
    .await?;

    Ok(SeedSummary {
        customers,
        jobs,
        estimates,
        invoices,
        webhooks,
        api_keys,
        ai_automations,
    })
}
