//! Deduplicating ingestion of fetched rows
//!
//! Turns one product's freshly fetched rows into discoveries: rows whose
//! dedup key is already stored are skipped (the usual case), rows that cannot
//! be stored are rejected, everything else is stamped and inserted.
//!
//! Rows are independent. A storage error on one row is counted and logged and
//! the rest of the batch is still attempted; the first such error is returned
//! once the batch is done.
//!
//! Discovery times never go backwards within a region: a new record is
//! stamped no earlier than the region's latest stored record, even if the
//! wall clock stepped back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{NewVersionRecord, ParsedFieldRow, VersionCandidate};
use crate::repository::{
    InsertOutcome, LatestByRegion, StorageError, StorageResult, VersionRepository,
};

/// Counters for one ingest call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub rows_seen: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub rejected: usize,
    /// Rows whose storage call failed
    pub failed: usize,
}

impl IngestStats {
    pub fn merge(&mut self, other: IngestStats) {
        self.rows_seen += other.rows_seen;
        self.inserted += other.inserted;
        self.skipped_existing += other.skipped_existing;
        self.rejected += other.rejected;
        self.failed += other.failed;
    }
}

enum RowOutcome {
    Inserted,
    AlreadyStored,
}

#[derive(Clone)]
pub struct IngestPipeline {
    repository: Arc<dyn VersionRepository>,
}

impl IngestPipeline {
    pub fn new(repository: Arc<dyn VersionRepository>) -> Self {
        Self { repository }
    }

    /// Store every unseen version among `rows`
    ///
    /// Every row is attempted. If any storage call failed the first error is
    /// returned after the batch; rows stored along the way stay stored.
    pub async fn ingest(&self, product: &str, rows: &[ParsedFieldRow]) -> StorageResult<IngestStats> {
        let mut stats = IngestStats {
            rows_seen: rows.len(),
            ..IngestStats::default()
        };
        let mut first_error: Option<StorageError> = None;
        let mut floor: Option<LatestByRegion> = None;

        for row in rows {
            let record = match VersionCandidate::from_row(row).into_record(product, Utc::now()) {
                Ok(record) => record,
                Err(reason) => {
                    warn!(product, reason = %reason, "Skipping unusable version row");
                    stats.rejected += 1;
                    continue;
                },
            };

            match self.store(record, &mut floor).await {
                Ok(RowOutcome::Inserted) => stats.inserted += 1,
                Ok(RowOutcome::AlreadyStored) => stats.skipped_existing += 1,
                Err(e) => {
                    error!(product, error = %e, "Failed to store version row");
                    stats.failed += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                },
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn store(
        &self,
        mut record: NewVersionRecord,
        floor: &mut Option<LatestByRegion>,
    ) -> StorageResult<RowOutcome> {
        if self.repository.exists(record.key()).await? {
            return Ok(RowOutcome::AlreadyStored);
        }

        if floor.is_none() {
            *floor = Some(self.repository.latest_per_region(&record.product).await?);
        }
        if let Some(latest) = floor.as_ref() {
            record.discovered_at = not_before(record.discovered_at, latest, &record.region);
        }

        match self.repository.insert(&record).await? {
            InsertOutcome::Inserted(stored) => {
                info!(
                    product = %stored.product,
                    region = %stored.region,
                    version = %stored.version_name,
                    build_id = %stored.build_id,
                    "New version found"
                );
                if let Some(latest) = floor.as_mut() {
                    latest.insert(stored.region.clone(), stored);
                }
                Ok(RowOutcome::Inserted)
            },
            InsertOutcome::AlreadyExists => {
                debug!(product = %record.product, region = %record.region, "Version stored concurrently");
                Ok(RowOutcome::AlreadyStored)
            },
        }
    }
}

/// `now`, or the region's latest discovery time if the clock is behind it
fn not_before(now: DateTime<Utc>, latest: &LatestByRegion, region: &str) -> DateTime<Utc> {
    latest
        .get(region)
        .map_or(now, |record| now.max(record.discovered_at))
}
