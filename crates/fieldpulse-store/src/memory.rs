use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fieldpulse_domain::Collection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::lease::StoreLease;
use crate::subscription::ListenerHandle;
use crate::{
    Document, DocumentCallback, DocumentStore, FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT,
    Filter, ListenerRegistry, SnapshotCallback, StoreError, Subscription, SubscriptionTarget,
};

const LOG_TARGET: &str = "fieldpulse.store";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    next_sequence: u64,
    #[serde(default)]
    collections: BTreeMap<String, BTreeMap<String, StoredDocument>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    sequence: u64,
    fields: Document,
}

impl StoreState {
    fn documents(&self, collection: Collection) -> Option<&BTreeMap<String, StoredDocument>> {
        self.collections.get(collection.as_str())
    }

    fn documents_mut(&mut self, collection: Collection) -> &mut BTreeMap<String, StoredDocument> {
        self.collections
            .entry(collection.as_str().to_string())
            .or_default()
    }

    fn ordered<'a>(
        &'a self,
        collection: Collection,
        predicate: impl Fn(&Document) -> bool,
    ) -> Vec<&'a StoredDocument> {
        let mut documents: Vec<&StoredDocument> = self
            .documents(collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|stored| predicate(&stored.fields))
                    .collect()
            })
            .unwrap_or_default();
        documents.sort_by(|left, right| newest_first(left, right));
        documents
    }

    fn snapshot(&self, collection: Collection, limit: Option<usize>) -> Vec<Document> {
        let ordered = self.ordered(collection, |_| true);
        let take = limit.unwrap_or(ordered.len());
        ordered
            .into_iter()
            .take(take)
            .map(|stored| stored.fields.clone())
            .collect()
    }

    fn document(&self, collection: Collection, id: &str) -> Option<Document> {
        self.documents(collection)
            .and_then(|documents| documents.get(id))
            .map(|stored| stored.fields.clone())
    }
}

fn created_at(document: &StoredDocument) -> Option<DateTime<Utc>> {
    document
        .fields
        .get(FIELD_CREATED_AT)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn newest_first(left: &StoredDocument, right: &StoredDocument) -> Ordering {
    created_at(right)
        .cmp(&created_at(left))
        .then_with(|| right.sequence.cmp(&left.sequence))
}

fn timestamp_value(value: DateTime<Utc>) -> Value {
    Value::String(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// In-process document store, optionally persisted to a JSON file.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    state: Arc<RwLock<StoreState>>,
    path: Option<PathBuf>,
    listeners: Arc<ListenerRegistry>,
    write_gate: Arc<Mutex<()>>,
    lease: Option<Arc<StoreLease>>,
}

impl MemoryDocumentStore {
    pub fn in_memory() -> Self {
        Self::with_state(StoreState::default(), None)
    }

    /// Loads the store from `path`; a missing, unreadable or corrupt file boots empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load_state(&path);
        Self::with_state(state, Some(path))
    }

    /// Opens `path` and takes its lease, so stores opened on the same file by
    /// other processes refuse to write until this store and its clones drop.
    pub fn open_leased(
        path: impl Into<PathBuf>,
        endpoint: Option<String>,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let lease = StoreLease::acquire(&path, endpoint)?;
        let mut store = Self::open(path);
        store.lease = Some(Arc::new(lease));
        Ok(store)
    }

    pub fn lease(&self) -> Option<&StoreLease> {
        self.lease.as_deref()
    }

    fn with_state(state: StoreState, path: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            path,
            listeners: ListenerRegistry::new(),
            write_gate: Arc::new(Mutex::new(())),
            lease: None,
        }
    }

    pub fn listener_registry(&self) -> Arc<ListenerRegistry> {
        Arc::clone(&self.listeners)
    }

    fn load_state(path: &PathBuf) -> StoreState {
        let raw = match std::fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return StoreState::default();
            }
            Err(error) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    path = %path.display(),
                    error = %error,
                    "failed to read document store; booting with empty state",
                );
                return StoreState::default();
            }
        };

        match serde_json::from_str::<StoreState>(&raw) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    path = %path.display(),
                    error = %error,
                    "failed to parse document store; booting with empty state",
                );
                StoreState::default()
            }
        }
    }

    async fn persist_state(&self, snapshot: &StoreState) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| StoreError::Persistence {
                    message: format!("failed to prepare document store directory: {error}"),
                })?;
        }

        let payload = serde_json::to_vec(snapshot).map_err(|error| StoreError::Persistence {
            message: format!("failed to encode document store payload: {error}"),
        })?;

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|error| StoreError::Persistence {
                message: format!("failed to write document store payload: {error}"),
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|error| StoreError::Persistence {
                message: format!("failed to finalize document store payload: {error}"),
            })?;

        Ok(())
    }

    /// A file leased by another process, or re-leased since this store took
    /// it, is read-only here.
    fn ensure_writable(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(lease) = self.lease.as_deref()
            && lease.is_current(path)
        {
            return Ok(());
        }
        match StoreLease::holder(path) {
            Some(holder) => Err(StoreError::Held {
                path: path.display().to_string(),
                pid: holder.pid,
                endpoint: holder.endpoint,
            }),
            None if self.lease.is_some() => Err(StoreError::Persistence {
                message: format!("lease on {} was released", path.display()),
            }),
            None => Ok(()),
        }
    }

    /// Applies `operation`, persists, then notifies listeners of `collection`.
    ///
    /// Callers hold the write gate so that listeners observe changes in the
    /// order they were applied.
    async fn mutate<T, F>(&self, collection: Collection, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreState) -> Result<(T, String), StoreError>,
    {
        if let Some(path) = self.path.as_deref() {
            self.ensure_writable(path)?;
        }
        let (result, changed_id, snapshot) = {
            let mut state = self.state.write().await;
            // Without a lease the file may have moved on since it was read.
            if let Some(path) = self.path.as_ref()
                && self.lease.is_none()
            {
                *state = Self::load_state(path);
            }
            let (result, changed_id) = operation(&mut state)?;
            (result, changed_id, state.clone())
        };

        self.persist_state(&snapshot).await?;
        self.notify(collection, &changed_id, &snapshot);
        Ok(result)
    }

    fn notify(&self, collection: Collection, changed_id: &str, state: &StoreState) {
        for listener in self.listeners.listeners_for(collection) {
            deliver_current(&listener, state, Some(changed_id));
        }
    }

    async fn insert(&self, collection: Collection, data: Document) -> Result<String, StoreError> {
        let _gate = self.write_gate.lock().await;
        self.mutate(collection, move |state| {
            let now = Utc::now();
            let id = format!("doc_{}", Uuid::new_v4().simple());

            let mut fields = data;
            let created_at = fields
                .get(FIELD_CREATED_AT)
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .unwrap_or(now);
            fields.insert(FIELD_ID.to_string(), Value::String(id.clone()));
            fields.insert(FIELD_CREATED_AT.to_string(), timestamp_value(created_at));
            fields.insert(FIELD_UPDATED_AT.to_string(), timestamp_value(now));

            state.next_sequence += 1;
            let sequence = state.next_sequence;
            state
                .documents_mut(collection)
                .insert(id.clone(), StoredDocument { sequence, fields });
            Ok((id.clone(), id))
        })
        .await
    }

    async fn merge(
        &self,
        collection: Collection,
        id: &str,
        partial: Document,
    ) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        self.mutate(collection, |state| {
            let stored = state
                .documents_mut(collection)
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found(collection, id))?;

            for (key, value) in partial {
                if key == FIELD_ID || key == FIELD_CREATED_AT {
                    continue;
                }
                stored.fields.insert(key, value);
            }
            stored
                .fields
                .insert(FIELD_UPDATED_AT.to_string(), timestamp_value(Utc::now()));
            Ok(((), id.to_string()))
        })
        .await
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        self.mutate(collection, |state| {
            state
                .documents_mut(collection)
                .remove(id)
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            Ok(((), id.to_string()))
        })
        .await
    }
}

/// Sends the listener its current view. Document listeners only hear about
/// their own document.
fn deliver_current(listener: &ListenerHandle, state: &StoreState, changed_id: Option<&str>) {
    match &listener.target {
        SubscriptionTarget::Collection { collection, limit } => {
            listener.deliver_snapshot(state.snapshot(*collection, *limit));
        }
        SubscriptionTarget::Document { collection, id } => {
            if changed_id.is_none_or(|changed| changed == id) {
                listener.deliver_document(state.document(*collection, id));
            }
        }
    }
}

fn log_failure(operation: &'static str, collection: Collection, error: &StoreError) {
    tracing::error!(
        target: LOG_TARGET,
        operation,
        collection = %collection,
        error = %error,
        "document store operation failed",
    );
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, collection: Collection, data: Document) -> Result<String, StoreError> {
        let id = self
            .insert(collection, data)
            .await
            .inspect_err(|error| log_failure("create", collection, error))?;
        tracing::debug!(target: LOG_TARGET, collection = %collection, id = %id, "document created");
        Ok(id)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: Document,
    ) -> Result<(), StoreError> {
        self.merge(collection, id, partial)
            .await
            .inspect_err(|error| log_failure("update", collection, error))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.remove(collection, id)
            .await
            .inspect_err(|error| log_failure("delete", collection, error))
    }

    async fn get_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.state.read().await.document(collection, id))
    }

    async fn list(
        &self,
        collection: Collection,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self.state.read().await.snapshot(collection, limit))
    }

    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .ordered(collection, |document| filter.matches(document))
            .into_iter()
            .map(|stored| stored.fields.clone())
            .collect())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        limit: Option<usize>,
        callback: SnapshotCallback,
    ) -> Result<Subscription, StoreError> {
        let _gate = self.write_gate.lock().await;
        let (subscription, handle) = self
            .listeners
            .register_collection(collection, limit, callback);
        let state = self.state.read().await.clone();
        deliver_current(&handle, &state, None);
        Ok(subscription)
    }

    async fn subscribe_document(
        &self,
        collection: Collection,
        id: &str,
        callback: DocumentCallback,
    ) -> Result<Subscription, StoreError> {
        let _gate = self.write_gate.lock().await;
        let (subscription, handle) = self.listeners.register_document(collection, id, callback);
        let document = self.state.read().await.document(collection, id);
        handle.deliver_document(document);
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use anyhow::Result;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::QueryOp;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(fields) => fields,
            _ => Document::new(),
        }
    }

    fn ids(documents: &[Document]) -> Vec<String> {
        documents
            .iter()
            .filter_map(|document| document.get(FIELD_ID).and_then(Value::as_str))
            .map(ToString::to_string)
            .collect()
    }

    #[tokio::test]
    async fn create_assigns_identity_and_timestamps() -> Result<()> {
        let store = MemoryDocumentStore::in_memory();
        let id = store
            .create(Collection::Customers, document(json!({"name": "Ada"})))
            .await?;
        assert!(id.starts_with("doc_"));

        let stored = store
            .get_by_id(Collection::Customers, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("missing document"))?;
        assert_eq!(stored.get(FIELD_ID), Some(&json!(id)));
        assert_eq!(stored.get("name"), Some(&json!("Ada")));
        assert!(stored.get(FIELD_CREATED_AT).is_some());
        assert_eq!(stored.get(FIELD_CREATED_AT), stored.get(FIELD_UPDATED_AT));
        Ok(())
    }

    #[tokio::test]
    async fn update_merges_without_removing_fields() -> Result<()> {
        let store = MemoryDocumentStore::in_memory();
        let id = store
            .create(
                Collection::Jobs,
                document(json!({"title": "Fix pipes", "status": "scheduled", "created_at": "2026-01-01T00:00:00Z"})),
            )
            .await?;

        store
            .update(
                Collection::Jobs,
                &id,
                document(json!({"status": "completed", "id": "hijack", "created_at": "2020-01-01T00:00:00Z"})),
            )
            .await?;

        let stored = store
            .get_by_id(Collection::Jobs, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("missing document"))?;
        assert_eq!(stored.get("status"), Some(&json!("completed")));
        assert_eq!(stored.get("title"), Some(&json!("Fix pipes")));
        assert_eq!(stored.get(FIELD_ID), Some(&json!(id)));
        assert_eq!(stored.get(FIELD_CREATED_AT), Some(&json!("2026-01-01T00:00:00Z")));
        assert_ne!(stored.get(FIELD_UPDATED_AT), stored.get(FIELD_CREATED_AT));
        Ok(())
    }

    #[tokio::test]
    async fn missing_documents_are_reported() -> Result<()> {
        let store = MemoryDocumentStore::in_memory();
        assert!(store.get_by_id(Collection::Jobs, "doc_none").await?.is_none());

        let update = store
            .update(Collection::Jobs, "doc_none", document(json!({"status": "completed"})))
            .await;
        assert!(matches!(update, Err(ref error) if error.is_not_found()));

        let delete = store.delete(Collection::Jobs, "doc_none").await;
        assert!(matches!(delete, Err(ref error) if error.is_not_found()));
        Ok(())
    }

    #[tokio::test]
    async fn deleted_documents_disappear() -> Result<()> {
        let store = MemoryDocumentStore::in_memory();
        let id = store
            .create(Collection::Estimates, document(json!({"title": "Roof"})))
            .await?;
        store.delete(Collection::Estimates, &id).await?;
        assert!(store.get_by_id(Collection::Estimates, &id).await?.is_none());
        assert!(store.list(Collection::Estimates, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_applies_limit() -> Result<()> {
        let store = MemoryDocumentStore::in_memory();
        let old = store
            .create(
                Collection::Jobs,
                document(json!({"title": "old", "created_at": "2026-01-01T00:00:00Z"})),
            )
            .await?;
        let first = store
            .create(Collection::Jobs, document(json!({"title": "first", "created_at": "2026-03-01T00:00:00Z"})))
            .await?;
        let second = store
            .create(Collection::Jobs, document(json!({"title": "second", "created_at": "2026-03-01T00:00:00Z"})))
            .await?;

        let listed = store.list(Collection::Jobs, None).await?;
        assert_eq!(ids(&listed), vec![second.clone(), first, old]);

        let limited = store.list(Collection::Jobs, Some(1)).await?;
        assert_eq!(ids(&limited), vec![second]);
        Ok(())
    }

    #[tokio::test]
    async fn query_filters_with_single_predicate() -> Result<()> {
        let store = MemoryDocumentStore::in_memory();
        let paid = store
            .create(Collection::Invoices, document(json!({"status": "paid", "total_amount": 350})))
            .await?;
        let sent = store
            .create(Collection::Invoices, document(json!({"status": "sent", "total_amount": 1250})))
            .await?;

        let by_status = store
            .query(Collection::Invoices, &Filter::eq("status", "paid"))
            .await?;
        assert_eq!(ids(&by_status), vec![paid.clone()]);

        let large = store
            .query(
                Collection::Invoices,
                &Filter::new("total_amount", QueryOp::Gt, 1000),
            )
            .await?;
        assert_eq!(ids(&large), vec![sent.clone()]);

        let either = store
            .query(
                Collection::Invoices,
                &Filter::new("status", QueryOp::In, json!(["paid", "sent"])),
            )
            .await?;
        assert_eq!(ids(&either), vec![sent, paid]);
        Ok(())
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_and_changed_snapshots() -> Result<()> {
        let store = MemoryDocumentStore::in_memory();
        store
            .create(Collection::Customers, document(json!({"name": "Ada"})))
            .await?;

        let seen: Arc<StdMutex<Vec<usize>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store
            .subscribe(
                Collection::Customers,
                None,
                Arc::new(move |documents| {
                    if let Ok(mut seen) = sink.lock() {
                        seen.push(documents.len());
                    }
                }),
            )
            .await?;

        let id = store
            .create(Collection::Customers, document(json!({"name": "Grace"})))
            .await?;
        store
            .create(Collection::Jobs, document(json!({"title": "other collection"})))
            .await?;
        store.delete(Collection::Customers, &id).await?;

        subscription.cancel();
        store
            .create(Collection::Customers, document(json!({"name": "Linus"})))
            .await?;

        let seen = seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
        assert_eq!(seen, vec![1, 2, 1]);
        assert_eq!(store.listener_registry().active_count(Collection::Customers), 0);
        Ok(())
    }

    #[tokio::test]
    async fn document_subscription_tracks_one_document() -> Result<()> {
        let store = MemoryDocumentStore::in_memory();
        let id = store
            .create(Collection::Jobs, document(json!({"status": "scheduled"})))
            .await?;
        let other = store
            .create(Collection::Jobs, document(json!({"status": "scheduled"})))
            .await?;

        let seen: Arc<StdMutex<Vec<Option<Value>>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = store
            .subscribe_document(
                Collection::Jobs,
                &id,
                Arc::new(move |document| {
                    if let Ok(mut seen) = sink.lock() {
                        seen.push(document.and_then(|fields| fields.get("status").cloned()));
                    }
                }),
            )
            .await?;

        store
            .update(Collection::Jobs, &other, document(json!({"status": "cancelled"})))
            .await?;
        store
            .update(Collection::Jobs, &id, document(json!({"status": "completed"})))
            .await?;
        store.delete(Collection::Jobs, &id).await?;

        let seen = seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
        assert_eq!(
            seen,
            vec![Some(json!("scheduled")), Some(json!("completed")), None]
        );
        Ok(())
    }

    #[tokio::test]
    async fn persisted_state_survives_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("store").join("documents.json");

        let store = MemoryDocumentStore::open(&path);
        let id = store
            .create(Collection::Webhooks, document(json!({"name": "Hooks"})))
            .await?;

        let reopened = MemoryDocumentStore::open(&path);
        let stored = reopened.get_by_id(Collection::Webhooks, &id).await?;
        assert_eq!(
            stored.and_then(|document| document.get("name").cloned()),
            Some(json!("Hooks"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn leased_file_rejects_writes_from_other_handles() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("documents.json");

        let owner = MemoryDocumentStore::open_leased(&path, Some("http://127.0.0.1:8790".into()))?;
        let other = MemoryDocumentStore::open(&path);

        let refused = other
            .create(Collection::Customers, document(json!({"name": "Ada"})))
            .await;
        assert!(matches!(
            refused,
            Err(StoreError::Held { ref endpoint, .. })
                if endpoint.as_deref() == Some("http://127.0.0.1:8790")
        ));
        assert!(other.list(Collection::Customers, None).await?.is_empty());

        owner
            .create(Collection::Customers, document(json!({"name": "Grace"})))
            .await?;
        drop(owner);

        other
            .create(Collection::Jobs, document(json!({"title": "Install Panel"})))
            .await?;
        let reopened = MemoryDocumentStore::open(&path);
        assert_eq!(reopened.list(Collection::Jobs, None).await?.len(), 1);
        assert_eq!(reopened.list(Collection::Customers, None).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_state_file_boots_empty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("documents.json");
        std::fs::write(&path, "{not json")?;

        let store = MemoryDocumentStore::open(&path);
        assert!(store.list(Collection::Customers, None).await?.is_empty());
        store
            .create(Collection::Customers, document(json!({"name": "Ada"})))
            .await?;
        assert_eq!(store.list(Collection::Customers, None).await?.len(), 1);
        Ok(())
    }
}
