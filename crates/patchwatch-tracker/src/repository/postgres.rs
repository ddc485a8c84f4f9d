//! PostgreSQL repository
//!
//! Backed by the `version_records` table (see `migrations/`). The
//! `version_records_dedup_key` unique constraint closes the check-then-insert
//! race: inserts use `ON CONFLICT DO NOTHING` and an empty `RETURNING` means
//! the key was already there.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::BTreeSet;
use tracing::debug;

use super::{InsertOutcome, LatestByRegion, RecentByRegion, StorageResult, VersionRepository};
use crate::models::{NewVersionRecord, VersionKey, VersionRecord};

/// Repository over a shared connection pool
#[derive(Debug, Clone)]
pub struct PgVersionRepository {
    db: PgPool,
}

impl PgVersionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

#[async_trait]
impl VersionRepository for PgVersionRepository {
    async fn exists(&self, key: VersionKey<'_>) -> StorageResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM version_records
                WHERE product = $1
                  AND region = $2
                  AND version_name = $3
                  AND build_id = $4
            )
            "#,
        )
        .bind(key.product)
        .bind(key.region)
        .bind(key.version_name)
        .bind(key.build_id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn insert(&self, record: &NewVersionRecord) -> StorageResult<InsertOutcome> {
        let stored: Option<VersionRecord> = sqlx::query_as(
            r#"
            INSERT INTO version_records (
                product,
                region,
                version_name,
                build_id,
                build_config,
                discovered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product, region, version_name, build_id)
            DO NOTHING
            RETURNING id, product, region, version_name, build_id, build_config, discovered_at
            "#,
        )
        .bind(&record.product)
        .bind(&record.region)
        .bind(&record.version_name)
        .bind(&record.build_id)
        .bind(&record.build_config)
        .bind(record.discovered_at)
        .fetch_optional(&self.db)
        .await?;

        Ok(match stored {
            Some(stored) => InsertOutcome::Inserted(stored),
            None => {
                debug!(
                    product = %record.product,
                    region = %record.region,
                    build_id = %record.build_id,
                    "Insert hit existing dedup key"
                );
                InsertOutcome::AlreadyExists
            },
        })
    }

    async fn latest_per_region(&self, product: &str) -> StorageResult<LatestByRegion> {
        let records: Vec<VersionRecord> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (region)
                id, product, region, version_name, build_id, build_config, discovered_at
            FROM version_records
            WHERE product = $1
            ORDER BY region, discovered_at DESC, id DESC
            "#,
        )
        .bind(product)
        .fetch_all(&self.db)
        .await?;

        Ok(records
            .into_iter()
            .map(|record| (record.region.clone(), record))
            .collect())
    }

    async fn top_n_per_region(&self, product: &str, n: usize) -> StorageResult<RecentByRegion> {
        let mut recent = RecentByRegion::new();
        if n == 0 {
            return Ok(recent);
        }

        let records: Vec<VersionRecord> = sqlx::query_as(
            r#"
            SELECT id, product, region, version_name, build_id, build_config, discovered_at
            FROM (
                SELECT
                    id, product, region, version_name, build_id, build_config, discovered_at,
                    ROW_NUMBER() OVER (
                        PARTITION BY region
                        ORDER BY discovered_at DESC, id DESC
                    ) AS recency_rank
                FROM version_records
                WHERE product = $1
            ) ranked
            WHERE recency_rank <= $2
            ORDER BY region, discovered_at DESC, id DESC
            "#,
        )
        .bind(product)
        .bind(i64::try_from(n).unwrap_or(i64::MAX))
        .fetch_all(&self.db)
        .await?;

        for record in records {
            recent.entry(record.region.clone()).or_default().push(record);
        }
        Ok(recent)
    }

    async fn distinct_products(&self) -> StorageResult<BTreeSet<String>> {
        let products: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT product FROM version_records")
                .fetch_all(&self.db)
                .await?;

        Ok(products.into_iter().collect())
    }
}
