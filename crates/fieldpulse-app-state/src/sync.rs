//! Cached view of the six synced collections.
//!
//! The cache is filled by a bulk load and then, in real-time mode, replaced
//! wholesale by collection subscriptions. With real-time off, every mutation
//! refetches the collection it touched.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use fieldpulse_domain::{
    ApiKey, ApiKeyDraft, ApiKeyPatch, Customer, CustomerDraft, CustomerPatch, DashboardStats,
    Entity, Estimate, EstimateDraft, EstimatePatch, Invoice, InvoiceDraft, InvoicePatch, Job,
    JobDraft, JobPatch, Webhook, WebhookDraft, WebhookPatch,
};
use fieldpulse_store::{DocumentStore, Repository, StoreError, Subscription};
use tokio::sync::Mutex;

const LOG_TARGET: &str = "fieldpulse.sync";

pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Limit applied to jobs, customers, estimates and invoices.
    pub page_size: usize,
    pub real_time: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            real_time: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store(error) => error.is_not_found(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
    pub jobs: Vec<Job>,
    pub customers: Vec<Customer>,
    pub estimates: Vec<Estimate>,
    pub invoices: Vec<Invoice>,
    pub webhooks: Vec<Webhook>,
    pub api_keys: Vec<ApiKey>,
}

/// Which loading flag a mutation holds while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingFlag {
    All,
    Jobs,
    Customers,
}

/// An entity with a slot in the sync cache.
pub trait SyncedEntity: Entity {
    /// Whether fetches of this collection use the page size.
    const PAGED: bool;
    const LOADING: Option<LoadingFlag> = None;

    fn slot(cache: &SyncSnapshot) -> &Vec<Self>;
    fn slot_mut(cache: &mut SyncSnapshot) -> &mut Vec<Self>;
}

macro_rules! synced_entity {
    ($entity:ty, $field:ident, $paged:expr, $loading:expr) => {
        impl SyncedEntity for $entity {
            const PAGED: bool = $paged;
            const LOADING: Option<LoadingFlag> = $loading;

            fn slot(cache: &SyncSnapshot) -> &Vec<Self> {
                &cache.$field
            }

            fn slot_mut(cache: &mut SyncSnapshot) -> &mut Vec<Self> {
                &mut cache.$field
            }
        }
    };
}

synced_entity!(Job, jobs, true, Some(LoadingFlag::Jobs));
synced_entity!(Customer, customers, true, Some(LoadingFlag::Customers));
synced_entity!(Estimate, estimates, true, None);
synced_entity!(Invoice, invoices, true, None);
synced_entity!(Webhook, webhooks, false, None);
synced_entity!(ApiKey, api_keys, false, None);

#[derive(Debug, Default)]
struct SyncState {
    cache: SyncSnapshot,
    is_loading: bool,
    is_jobs_loading: bool,
    is_customers_loading: bool,
    real_time: bool,
}

fn write_state(state: &RwLock<SyncState>) -> RwLockWriteGuard<'_, SyncState> {
    state
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_state(state: &RwLock<SyncState>) -> RwLockReadGuard<'_, SyncState> {
    state
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sets a loading flag for its lifetime.
struct LoadingGuard<'a> {
    state: &'a RwLock<SyncState>,
    flag: LoadingFlag,
}

impl<'a> LoadingGuard<'a> {
    fn set(state: &'a RwLock<SyncState>, flag: LoadingFlag) -> Self {
        Self::assign(state, flag, true);
        Self { state, flag }
    }

    fn assign(state: &RwLock<SyncState>, flag: LoadingFlag, value: bool) {
        let mut state = write_state(state);
        match flag {
            LoadingFlag::All => state.is_loading = value,
            LoadingFlag::Jobs => state.is_jobs_loading = value,
            LoadingFlag::Customers => state.is_customers_loading = value,
        }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        Self::assign(self.state, self.flag, false);
    }
}

pub struct SyncContext {
    store: Arc<dyn DocumentStore>,
    options: SyncOptions,
    state: Arc<RwLock<SyncState>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SyncContext {
    pub fn new(store: Arc<dyn DocumentStore>, options: SyncOptions) -> Self {
        Self {
            store,
            options,
            state: Arc::new(RwLock::new(SyncState::default())),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    /// Bulk load, then live subscriptions when the options ask for them.
    pub async fn start(&self) -> Result<(), SyncError> {
        self.load_initial_data().await;
        if self.options.real_time {
            self.set_real_time_sync(true).await?;
        }
        Ok(())
    }

    fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(Arc::clone(&self.store))
    }

    fn limit_for<E: SyncedEntity>(&self) -> Option<usize> {
        E::PAGED.then_some(self.options.page_size.max(1))
    }

    async fn fetch<E: SyncedEntity>(&self) -> Result<Vec<E>, StoreError> {
        self.repository::<E>().list(self.limit_for::<E>()).await
    }

    async fn fetch_all(&self) -> Result<SyncSnapshot, SyncError> {
        let (jobs, customers, estimates, invoices, webhooks, api_keys) = tokio::try_join!(
            self.fetch::<Job>(),
            self.fetch::<Customer>(),
            self.fetch::<Estimate>(),
            self.fetch::<Invoice>(),
            self.fetch::<Webhook>(),
            self.fetch::<ApiKey>(),
        )?;
        Ok(SyncSnapshot {
            jobs,
            customers,
            estimates,
            invoices,
            webhooks,
            api_keys,
        })
    }

    /// Replaces the cache with a fresh fetch. Failures are logged and leave the
    /// cache untouched.
    pub async fn load_initial_data(&self) {
        let _loading = LoadingGuard::set(&self.state, LoadingFlag::All);
        match self.fetch_all().await {
            Ok(snapshot) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    jobs = snapshot.jobs.len(),
                    customers = snapshot.customers.len(),
                    "initial data loaded",
                );
                write_state(&self.state).cache = snapshot;
            }
            Err(error) => {
                tracing::error!(
                    target: LOG_TARGET,
                    error = %error,
                    "failed to load initial data",
                );
            }
        }
    }

    pub async fn refresh_data(&self) -> Result<(), SyncError> {
        let _loading = LoadingGuard::set(&self.state, LoadingFlag::All);
        let snapshot = self.fetch_all().await.inspect_err(|error| {
            tracing::error!(target: LOG_TARGET, error = %error, "failed to refresh data");
        })?;
        write_state(&self.state).cache = snapshot;
        Ok(())
    }

    async fn subscribe<E: SyncedEntity>(&self) -> Result<Subscription, StoreError> {
        let state = Arc::clone(&self.state);
        self.repository::<E>()
            .subscribe(self.limit_for::<E>(), move |entities| {
                *E::slot_mut(&mut write_state(&state).cache) = entities;
            })
            .await
    }

    /// Enabling establishes one subscription per collection, once; disabling
    /// cancels them all.
    pub async fn set_real_time_sync(&self, enabled: bool) -> Result<(), SyncError> {
        let mut subscriptions = self.subscriptions.lock().await;

        if !enabled {
            let cancelled = subscriptions.len();
            subscriptions.drain(..).for_each(Subscription::cancel);
            write_state(&self.state).real_time = false;
            tracing::info!(target: LOG_TARGET, cancelled, "real-time sync disabled");
            return Ok(());
        }

        if !subscriptions.is_empty() {
            return Ok(());
        }

        let established = vec![
            self.subscribe::<Job>().await?,
            self.subscribe::<Customer>().await?,
            self.subscribe::<Estimate>().await?,
            self.subscribe::<Invoice>().await?,
            self.subscribe::<Webhook>().await?,
            self.subscribe::<ApiKey>().await?,
        ];
        *subscriptions = established;
        write_state(&self.state).real_time = true;
        tracing::info!(target: LOG_TARGET, "real-time sync enabled");
        Ok(())
    }

    pub fn is_real_time(&self) -> bool {
        read_state(&self.state).real_time
    }

    async fn refetch_if_static<E: SyncedEntity>(&self) -> Result<(), SyncError> {
        if self.is_real_time() {
            return Ok(());
        }
        let entities = self.fetch::<E>().await?;
        *E::slot_mut(&mut write_state(&self.state).cache) = entities;
        Ok(())
    }

    fn mutation_guard<E: SyncedEntity>(&self) -> Option<LoadingGuard<'_>> {
        E::LOADING.map(|flag| LoadingGuard::set(&self.state, flag))
    }

    /// Creates a record; without real-time sync the collection is refetched.
    pub async fn create<E: SyncedEntity>(&self, draft: &E::Draft) -> Result<String, SyncError> {
        let _loading = self.mutation_guard::<E>();
        let id = self.repository::<E>().create(draft).await?;
        self.refetch_if_static::<E>().await?;
        Ok(id)
    }

    pub async fn update<E: SyncedEntity>(
        &self,
        id: &str,
        patch: &E::Patch,
    ) -> Result<(), SyncError> {
        let _loading = self.mutation_guard::<E>();
        self.repository::<E>().update(id, patch).await?;
        self.refetch_if_static::<E>().await
    }

    pub async fn delete<E: SyncedEntity>(&self, id: &str) -> Result<(), SyncError> {
        let _loading = self.mutation_guard::<E>();
        self.repository::<E>().delete(id).await?;
        self.refetch_if_static::<E>().await
    }

    /// The cached collection, or one record of it.
    pub fn cached<E: SyncedEntity>(&self) -> Vec<E> {
        E::slot(&read_state(&self.state).cache).clone()
    }

    pub fn cached_by_id<E: SyncedEntity>(&self, id: &str) -> Option<E> {
        E::slot(&read_state(&self.state).cache)
            .iter()
            .find(|entity| entity.id() == id)
            .cloned()
    }

    pub async fn create_job(&self, draft: &JobDraft) -> Result<String, SyncError> {
        self.create::<Job>(draft).await
    }

    pub async fn update_job(&self, id: &str, patch: &JobPatch) -> Result<(), SyncError> {
        self.update::<Job>(id, patch).await
    }

    pub async fn delete_job(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<Job>(id).await
    }

    pub async fn create_customer(&self, draft: &CustomerDraft) -> Result<String, SyncError> {
        self.create::<Customer>(draft).await
    }

    pub async fn update_customer(&self, id: &str, patch: &CustomerPatch) -> Result<(), SyncError> {
        self.update::<Customer>(id, patch).await
    }

    pub async fn delete_customer(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<Customer>(id).await
    }

    pub async fn create_estimate(&self, draft: &EstimateDraft) -> Result<String, SyncError> {
        self.create::<Estimate>(draft).await
    }

    pub async fn update_estimate(&self, id: &str, patch: &EstimatePatch) -> Result<(), SyncError> {
        self.update::<Estimate>(id, patch).await
    }

    pub async fn delete_estimate(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<Estimate>(id).await
    }

    pub async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<String, SyncError> {
        self.create::<Invoice>(draft).await
    }

    pub async fn update_invoice(&self, id: &str, patch: &InvoicePatch) -> Result<(), SyncError> {
        self.update::<Invoice>(id, patch).await
    }

    pub async fn delete_invoice(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<Invoice>(id).await
    }

    pub async fn create_webhook(&self, draft: &WebhookDraft) -> Result<String, SyncError> {
        self.create::<Webhook>(draft).await
    }

    pub async fn update_webhook(&self, id: &str, patch: &WebhookPatch) -> Result<(), SyncError> {
        self.update::<Webhook>(id, patch).await
    }

    pub async fn delete_webhook(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<Webhook>(id).await
    }

    pub async fn create_api_key(&self, draft: &ApiKeyDraft) -> Result<String, SyncError> {
        self.create::<ApiKey>(draft).await
    }

    pub async fn update_api_key(&self, id: &str, patch: &ApiKeyPatch) -> Result<(), SyncError> {
        self.update::<ApiKey>(id, patch).await
    }

    pub async fn delete_api_key(&self, id: &str) -> Result<(), SyncError> {
        self.delete::<ApiKey>(id).await
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        read_state(&self.state).cache.clone()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.cached::<Job>()
    }

    pub fn customers(&self) -> Vec<Customer> {
        self.cached::<Customer>()
    }

    pub fn estimates(&self) -> Vec<Estimate> {
        self.cached::<Estimate>()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.cached::<Invoice>()
    }

    pub fn webhooks(&self) -> Vec<Webhook> {
        self.cached::<Webhook>()
    }

    pub fn api_keys(&self) -> Vec<ApiKey> {
        self.cached::<ApiKey>()
    }

    pub fn is_loading(&self) -> bool {
        read_state(&self.state).is_loading
    }

    pub fn is_jobs_loading(&self) -> bool {
        read_state(&self.state).is_jobs_loading
    }

    pub fn is_customers_loading(&self) -> bool {
        read_state(&self.state).is_customers_loading
    }

    pub fn dashboard_stats(&self, now: DateTime<Utc>) -> DashboardStats {
        let state = read_state(&self.state);
        DashboardStats::compute(
            &state.cache.customers,
            &state.cache.jobs,
            &state.cache.estimates,
            &state.cache.invoices,
            now,
        )
    }
}
