//! Collaborator contracts for the primary store and the search index.
//!
//! The pipeline only talks to these traits. Backends:
//!
//! ```text
//! storage/
//! ├── mongo.rs     # MongoStore: live MongoDB deployment
//! ├── local.rs     # SnapshotStore: exported collections on disk
//! ├── elastic.rs   # ElasticIndex: Elasticsearch bulk API over HTTP
//! └── memory.rs    # MemoryStore / MemoryIndex: in-process, fault injectable
//! ```

pub mod elastic;
pub mod local;
pub mod memory;
pub mod mongo;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{
    Hospital, HospitalDocument, Pharmacy, RawSchedule, SatelliteKind, StoreBackend, StoreConfig,
};

// Re-export for convenience
pub use elastic::ElasticIndex;
pub use local::SnapshotStore;
pub use memory::{MemoryIndex, MemoryStore};
pub use mongo::MongoStore;

/// Connection handle and read interface of the primary store.
///
/// Transient failures surface as [`AppError::Network`](crate::error::AppError::Network).
#[async_trait]
pub trait FacilityStore: Send + Sync {
    /// Establish the connection.
    async fn connect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Cheap liveness check on an established connection.
    async fn ping(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Total hospitals, for progress reporting only.
    async fn count_hospitals(&self) -> Result<u64>;

    /// Hospitals with `_id` strictly greater than `after`, ascending, at most `limit`.
    async fn hospitals_after(&self, after: Option<&str>, limit: usize) -> Result<Vec<Hospital>>;

    /// Satellite rows of `kind` for one facility.
    async fn satellite(&self, kind: SatelliteKind, ykiho: &str) -> Result<Vec<Value>>;

    /// Raw opening-hours record for one facility.
    async fn schedule(&self, ykiho: &str) -> Result<Option<RawSchedule>>;

    /// Bulk projected read of every pharmacy with coordinates.
    async fn pharmacies_with_position(&self) -> Result<Vec<Pharmacy>>;
}

/// A write against the search index.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Insert or fully replace the document stored under `id`.
    Upsert {
        id: String,
        document: Box<HospitalDocument>,
    },
}

impl BulkAction {
    pub fn upsert(document: HospitalDocument) -> Self {
        Self::Upsert {
            id: document.ykiho.clone(),
            document: Box::new(document),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Upsert { id, .. } => id,
        }
    }
}

/// Refresh behavior of a bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Leave refresh to the index's schedule
    Deferred,
    /// Make the writes searchable before returning
    Immediate,
}

/// Outcome of one action in a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemOutcome {
    pub id: String,
    /// Rejection cause, `None` on success
    pub error: Option<String>,
}

/// Per-item results of a bulk request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub items: Vec<BulkItemOutcome>,
}

impl BulkResponse {
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|item| item.error.is_some())
    }

    /// Items the index rejected.
    pub fn rejected(&self) -> impl Iterator<Item = &BulkItemOutcome> {
        self.items.iter().filter(|item| item.error.is_some())
    }
}

/// Write interface of the search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Submit actions as one request; returns per-item results.
    async fn bulk(&self, actions: &[BulkAction], refresh: Refresh) -> Result<BulkResponse>;

    /// Make all previous writes searchable.
    async fn refresh(&self) -> Result<()>;
}

/// Primary store selected by `[store] backend`. Nothing connects yet.
pub fn open_store(config: &StoreConfig) -> Arc<dyn FacilityStore> {
    match config.backend {
        StoreBackend::Mongo => {
            log::info!("Primary store: MongoDB database {}", config.database);
            Arc::new(MongoStore::from_config(config))
        }
        StoreBackend::Snapshot => {
            log::info!("Primary store: snapshot at {}", config.data_dir.display());
            Arc::new(SnapshotStore::new(&config.data_dir))
        }
    }
}

/// Run a collaborator call under a deadline. Expiry is a network error.
pub async fn with_timeout<T, F>(limit: Duration, context: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::network(
            context,
            format!("timed out after {}s", limit.as_secs_f64()),
        )),
    }
}
