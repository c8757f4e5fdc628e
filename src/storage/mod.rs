//! Record Storage
//! Mission: Own the patient, doctor and appointment collections behind one contract
//!
//! Two backings implement the same [`RecordStore`] contract and are chosen at
//! startup:
//! - [`memory::MemoryStore`]: collections guarded by a single readers-writer
//!   lock, every mutation persisted as a full JSON snapshot.
//! - [`sql::SqlStore`]: pooled SQLite, one statement per operation, ids
//!   assigned by the engine.

pub mod memory;
pub mod sql;

use crate::config::{StorageBackend, StorageSettings};
use crate::models::{Appointment, Doctor, Patient};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use memory::{MemoryStore, Snapshot};
pub use sql::SqlStore;

/// Store failures, classified by kind so callers never inspect message text.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A patient or doctor reference points at a row that does not exist.
    #[error("{0}")]
    InvalidReference(String),

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub fn not_found<R: Record>(id: i64) -> Self {
        StoreError::NotFound {
            entity: R::LABEL,
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// A stored entity with a store-assigned integer identifier.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    type Filter: RecordFilter<Self>;

    /// Human-readable entity name ("Patient").
    const LABEL: &'static str;

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Field-level checks applied before a record reaches the store.
    fn validate(&self) -> Result<(), String>;
}

/// Optional AND-combined predicates over one record type.
pub trait RecordFilter<R>: DeserializeOwned + Default + Send + Sync + 'static {
    fn is_empty(&self) -> bool;

    fn matches(&self, record: &R) -> bool;
}

/// CRUD over one record collection.
///
/// `list` returns records in insertion (id) order and an empty vector,
/// never an error, when nothing matches.
#[async_trait]
pub trait Collection<R: Record>: Send + Sync {
    async fn list(&self, filter: &R::Filter) -> Result<Vec<R>, StoreError>;

    async fn get(&self, id: i64) -> Result<R, StoreError>;

    /// Assigns a fresh id (any id on `record` is ignored) and returns the stored record.
    async fn create(&self, record: R) -> Result<R, StoreError>;

    /// Replaces every mutable field; the id is immutable.
    async fn update(&self, id: i64, record: R) -> Result<R, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// The full store: one collection per entity type.
pub trait RecordStore: Collection<Patient> + Collection<Doctor> + Collection<Appointment> {
    /// Backing name reported by the health endpoint.
    fn backend(&self) -> &'static str;
}

/// Open the backing selected by configuration.
pub async fn open(settings: &StorageSettings) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match settings.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::open(&settings.data_file).await?),
        StorageBackend::Sql => Arc::new(SqlStore::connect(&settings.pool).await?),
    };

    info!("💾 Record store ready (backend: {})", store.backend());
    Ok(store)
}
