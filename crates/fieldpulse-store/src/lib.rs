//! Document store client: collection CRUD, single-predicate queries and live
//! subscriptions, plus typed repositories over the domain entities.

mod error;
mod filter;
mod lease;
mod memory;
pub mod queries;
mod repository;
pub mod seed;
mod subscription;

use async_trait::async_trait;
use fieldpulse_domain::Collection;

pub use error::StoreError;
pub use filter::{Filter, QueryOp, UnknownOperator};
pub use lease::{LeaseHolder, StoreLease};
pub use memory::MemoryDocumentStore;
pub use repository::{Repository, decode_document, to_document};
pub use subscription::{
    DocumentCallback, ListenerRegistry, SnapshotCallback, Subscription, SubscriptionTarget,
};

/// A stored document: a JSON object carrying `id`, `created_at` and `updated_at`
/// alongside its own fields.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores `data` under a generated id and returns it.
    async fn create(&self, collection: Collection, data: Document) -> Result<String, StoreError>;

    /// Merges `partial` into the stored document and refreshes `updated_at`.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: Document,
    ) -> Result<(), StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    async fn get_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Newest first by `created_at`.
    async fn list(
        &self,
        collection: Collection,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Document>, StoreError>;

    /// Delivers the ordered collection to `callback` now and after every change.
    async fn subscribe(
        &self,
        collection: Collection,
        limit: Option<usize>,
        callback: SnapshotCallback,
    ) -> Result<Subscription, StoreError>;

    async fn subscribe_document(
        &self,
        collection: Collection,
        id: &str,
        callback: DocumentCallback,
    ) -> Result<Subscription, StoreError>;
}
