//! Persistence boundary for discovered versions
//!
//! The history is append-only. Uniqueness of the dedup key
//! `(product, region, version_name, build_id)` is enforced by the store
//! itself, so concurrent check-then-insert sequences (overlapping poll cycles,
//! external writers) can never produce two rows for one key: the losing insert
//! simply reports [`InsertOutcome::AlreadyExists`].
//!
//! "Most recent" always means highest `discovered_at`, ties broken by highest
//! `id`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{NewVersionRecord, VersionKey, VersionRecord};

pub use memory::InMemoryVersionRepository;
pub use postgres::PgVersionRepository;

/// Result type for repository operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failure of the underlying store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// What happened to an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(VersionRecord),
    /// The dedup key was already stored; nothing was written
    AlreadyExists,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Latest record per region
pub type LatestByRegion = BTreeMap<String, VersionRecord>;

/// Most recent records per region, newest first
pub type RecentByRegion = BTreeMap<String, Vec<VersionRecord>>;

#[async_trait]
pub trait VersionRepository: Send + Sync {
    async fn exists(&self, key: VersionKey<'_>) -> StorageResult<bool>;

    /// Store a record unless its dedup key is already present
    async fn insert(&self, record: &NewVersionRecord) -> StorageResult<InsertOutcome>;

    /// For each region of `product`, its most recent record
    async fn latest_per_region(&self, product: &str) -> StorageResult<LatestByRegion>;

    /// For each region of `product`, up to `n` most recent records, newest first
    async fn top_n_per_region(&self, product: &str, n: usize) -> StorageResult<RecentByRegion>;

    /// Every product with at least one stored record
    async fn distinct_products(&self) -> StorageResult<BTreeSet<String>>;
}
