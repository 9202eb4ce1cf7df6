use std::marker::PhantomData;
use std::sync::Arc;

use fieldpulse_domain::{Collection, Entity, Validate};
use serde::Serialize;
use serde_json::Value;

use crate::{Document, DocumentStore, Filter, StoreError, Subscription};

/// Serializes `value` into a store document. Non-object values are rejected.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::Encode {
            message: format!("expected a JSON object, found {other}"),
        }),
        Err(error) => Err(StoreError::Encode {
            message: error.to_string(),
        }),
    }
}

pub fn decode_document<E: Entity>(document: Document) -> Result<E, StoreError> {
    serde_json::from_value(Value::Object(document)).map_err(|error| StoreError::Decode {
        collection: E::COLLECTION,
        message: error.to_string(),
    })
}

/// Typed access to the collection that stores `E`.
pub struct Repository<E: Entity> {
    store: Arc<dyn DocumentStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub const fn collection(&self) -> Collection {
        E::COLLECTION
    }

    pub async fn create(&self, draft: &E::Draft) -> Result<String, StoreError> {
        draft.validate()?;
        self.store.create(E::COLLECTION, to_document(draft)?).await
    }

    pub async fn update(&self, id: &str, patch: &E::Patch) -> Result<(), StoreError> {
        patch.validate()?;
        self.store
            .update(E::COLLECTION, id, to_document(patch)?)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(E::COLLECTION, id).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<E>, StoreError> {
        self.store
            .get_by_id(E::COLLECTION, id)
            .await?
            .map(decode_document)
            .transpose()
    }

    /// Documents that fail to decode are skipped and logged, as in `subscribe`.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<E>, StoreError> {
        let documents = self.store.list(E::COLLECTION, limit).await?;
        Ok(decode_snapshot(documents))
    }

    pub async fn query(&self, filter: &Filter) -> Result<Vec<E>, StoreError> {
        let documents = self.store.query(E::COLLECTION, filter).await?;
        Ok(decode_snapshot(documents))
    }

    /// Live typed snapshots. Documents that fail to decode are skipped and logged.
    pub async fn subscribe<F>(&self, limit: Option<usize>, callback: F) -> Result<Subscription, StoreError>
    where
        F: Fn(Vec<E>) + Send + Sync + 'static,
    {
        self.store
            .subscribe(
                E::COLLECTION,
                limit,
                Arc::new(move |documents| callback(decode_snapshot(documents))),
            )
            .await
    }

    /// Creates every draft concurrently; fails if any create fails.
    pub async fn bulk_create(&self, drafts: &[E::Draft]) -> Result<Vec<String>, StoreError> {
        futures::future::try_join_all(drafts.iter().map(|draft| self.create(draft))).await
    }

    pub async fn bulk_update(&self, updates: &[(String, E::Patch)]) -> Result<(), StoreError> {
        futures::future::try_join_all(updates.iter().map(|(id, patch)| self.update(id, patch)))
            .await?;
        Ok(())
    }
}

fn decode_snapshot<E: Entity>(documents: Vec<Document>) -> Vec<E> {
    documents
        .into_iter()
        .filter_map(|document| match decode_document::<E>(document) {
            Ok(entity) => Some(entity),
            Err(error) => {
                tracing::warn!(
                    target: "fieldpulse.store",
                    collection = %E::COLLECTION,
                    error = %error,
                    "skipping undecodable document",
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::Result;
    use fieldpulse_domain::{Customer, CustomerDraft, Job, JobDraft, JobPatch, JobStatus};
    use serde_json::json;

    use super::*;
    use crate::MemoryDocumentStore;

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryDocumentStore::in_memory())
    }

    #[tokio::test]
    async fn typed_create_and_read_back() -> Result<()> {
        let customers = Repository::<Customer>::new(store());
        let id = customers.create(&CustomerDraft::named("Ada Lovelace")).await?;

        let customer = customers
            .get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("missing customer"))?;
        assert_eq!(customer.id, id);
        assert_eq!(customer.name, "Ada Lovelace");
        assert_eq!(customers.list(None).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_store() -> Result<()> {
        let store = store();
        let customers = Repository::<Customer>::new(Arc::clone(&store));
        let error = customers.create(&CustomerDraft::named("   ")).await;
        assert!(matches!(error, Err(StoreError::Validation(ref error)) if error.field == "name"));
        assert!(store.list(Collection::Customers, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn status_patch_touches_only_status() -> Result<()> {
        let jobs = Repository::<Job>::new(store());
        let id = jobs
            .create(&JobDraft::new("doc_customer", "Fix pipes", JobStatus::Scheduled))
            .await?;
        jobs.update(&id, &JobPatch::status(JobStatus::Completed)).await?;

        let job = jobs
            .get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("missing job"))?;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.title, "Fix pipes");
        assert_eq!(job.customer_id, "doc_customer");
        Ok(())
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() -> Result<()> {
        let jobs = Repository::<Job>::new(store());
        let id = jobs
            .create(&JobDraft::new("doc_customer", "Fix pipes", JobStatus::Scheduled))
            .await?;
        let result = jobs.update(&id, &JobPatch::default()).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn subscription_skips_undecodable_documents() -> Result<()> {
        let store = store();
        store
            .create(Collection::Jobs, to_document(&json!({"title": "no status"}))?)
            .await?;
        let jobs = Repository::<Job>::new(Arc::clone(&store));
        jobs.create(&JobDraft::new("c1", "Valid", JobStatus::Scheduled))
            .await?;

        let titles = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&titles);
        let _subscription = jobs
            .subscribe(None, move |jobs| {
                if let Ok(mut titles) = sink.lock() {
                    titles.push(jobs.into_iter().map(|job| job.title).collect::<Vec<_>>());
                }
            })
            .await?;

        let titles = titles.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
        assert_eq!(titles, vec![vec!["Valid".to_string()]]);
        Ok(())
    }

    #[tokio::test]
    async fn list_and_query_skip_undecodable_documents() -> Result<()> {
        let store = store();
        store
            .create(
                Collection::Jobs,
                to_document(&json!({"title": "legacy, no status", "customer_id": "c1"}))?,
            )
            .await?;
        let jobs = Repository::<Job>::new(Arc::clone(&store));
        jobs.create(&JobDraft::new("c1", "Install Panel", JobStatus::Scheduled))
            .await?;

        let listed = jobs.list(None).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Install Panel");

        let matched = jobs.query(&Filter::eq("customer_id", "c1")).await?;
        assert_eq!(matched.len(), 1);
        assert_eq!(store.list(Collection::Jobs, None).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn bulk_helpers_apply_every_item() -> Result<()> {
        let jobs = Repository::<Job>::new(store());
        let ids = jobs
            .bulk_create(&[
                JobDraft::new("c1", "One", JobStatus::Scheduled),
                JobDraft::new("c2", "Two", JobStatus::Scheduled),
            ])
            .await?;
        assert_eq!(ids.len(), 2);

        let updates: Vec<(String, JobPatch)> = ids
            .iter()
            .map(|id| (id.clone(), JobPatch::status(JobStatus::Cancelled)))
            .collect();
        jobs.bulk_update(&updates).await?;

        let cancelled = jobs.query(&Filter::eq("status", "cancelled")).await?;
        assert_eq!(cancelled.len(), 2);
        Ok(())
    }

    #[test]
    fn non_object_values_are_not_documents() {
        assert!(matches!(to_document(&json!([1, 2])), Err(StoreError::Encode { .. })));
    }
}
