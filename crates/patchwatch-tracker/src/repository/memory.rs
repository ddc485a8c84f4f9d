//! In-process repository
//!
//! Holds the whole history behind one `RwLock`; the key check and the append
//! happen under the same write guard, which gives the same uniqueness
//! guarantee as the database constraint within a single process.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{
    InsertOutcome, LatestByRegion, RecentByRegion, StorageError, StorageResult, VersionRepository,
};
use crate::models::{NewVersionRecord, OwnedVersionKey, VersionKey, VersionRecord};

#[derive(Default)]
struct MemoryState {
    last_id: i64,
    records: Vec<VersionRecord>,
    keys: HashSet<OwnedVersionKey>,
}

#[derive(Default)]
pub struct InMemoryVersionRepository {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl InMemoryVersionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StorageError::Unavailable`] until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of every stored record in insertion order
    pub async fn all(&self) -> Vec<VersionRecord> {
        self.state.read().await.records.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }

    /// Records of `product` sorted by region, then most recent first
    async fn product_records(&self, product: &str) -> Vec<VersionRecord> {
        let state = self.state.read().await;
        let mut records: Vec<VersionRecord> = state
            .records
            .iter()
            .filter(|r| r.product == product)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.region.cmp(&b.region).then_with(|| a.recency_cmp(b)));
        records
    }
}

#[async_trait]
impl VersionRepository for InMemoryVersionRepository {
    async fn exists(&self, key: VersionKey<'_>) -> StorageResult<bool> {
        self.check_available()?;
        Ok(self.state.read().await.keys.contains(&key.to_owned_key()))
    }

    async fn insert(&self, record: &NewVersionRecord) -> StorageResult<InsertOutcome> {
        self.check_available()?;

        let mut state = self.state.write().await;
        if !state.keys.insert(record.key().to_owned_key()) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        state.last_id += 1;
        let stored = VersionRecord {
            id: state.last_id,
            product: record.product.clone(),
            region: record.region.clone(),
            version_name: record.version_name.clone(),
            build_id: record.build_id.clone(),
            build_config: record.build_config.clone(),
            discovered_at: record.discovered_at,
        };
        state.records.push(stored.clone());

        Ok(InsertOutcome::Inserted(stored))
    }

    async fn latest_per_region(&self, product: &str) -> StorageResult<LatestByRegion> {
        self.check_available()?;

        let mut latest = LatestByRegion::new();
        for record in self.product_records(product).await {
            latest.entry(record.region.clone()).or_insert(record);
        }
        Ok(latest)
    }

    async fn top_n_per_region(&self, product: &str, n: usize) -> StorageResult<RecentByRegion> {
        self.check_available()?;

        let mut recent = RecentByRegion::new();
        if n == 0 {
            return Ok(recent);
        }

        for record in self.product_records(product).await {
            let bucket = recent.entry(record.region.clone()).or_default();
            if bucket.len() < n {
                bucket.push(record);
            }
        }
        Ok(recent)
    }

    async fn distinct_products(&self) -> StorageResult<BTreeSet<String>> {
        self.check_available()?;

        let state = self.state.read().await;
        Ok(state.records.iter().map(|r| r.product.clone()).collect())
    }
}
