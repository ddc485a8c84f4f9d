//! PostgreSQL repository tests using SQLx
//!
//! Each test gets a fresh database with the crate migrations applied.
//! Run with `DATABASE_URL` pointing at a server and `--ignored`.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use patchwatch_tracker::models::NewVersionRecord;
use patchwatch_tracker::repository::InsertOutcome;
use patchwatch_tracker::{IngestPipeline, ParsedFieldRow, PgVersionRepository, VersionRepository};
use sqlx::PgPool;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn record(product: &str, region: &str, build_id: &str, secs: i64) -> NewVersionRecord {
    NewVersionRecord {
        product: product.to_string(),
        region: region.to_string(),
        version_name: format!("11.0.2.{build_id}"),
        build_id: build_id.to_string(),
        build_config: format!("cfg{build_id}"),
        discovered_at: at(secs),
    }
}

// ============================================================================
// Insert / Dedup Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires database
async fn test_insert_then_duplicate_key(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgVersionRepository::new(pool.clone());
    let first = record("wow", "us", "56461", 100);

    let outcome = repo.insert(&first).await.expect("insert succeeds");
    let InsertOutcome::Inserted(stored) = outcome else {
        panic!("first insert was skipped");
    };
    assert!(stored.id > 0);
    assert_eq!(stored.discovered_at, at(100));

    let mut same_key = record("wow", "us", "56461", 200);
    same_key.build_config = "other".to_string();
    assert_eq!(
        repo.insert(&same_key).await.expect("insert succeeds"),
        InsertOutcome::AlreadyExists
    );
    assert!(repo.exists(first.key()).await.expect("exists succeeds"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM version_records")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 1);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires database
async fn test_concurrent_inserts_store_one_row(pool: PgPool) -> sqlx::Result<()> {
    let repo = Arc::new(PgVersionRepository::new(pool.clone()));
    let shared = record("wow", "eu", "777", 42);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let repo = Arc::clone(&repo);
            let shared = shared.clone();
            tokio::spawn(async move { repo.insert(&shared).await })
        })
        .collect();

    let mut inserted = 0;
    for task in tasks {
        if task.await.expect("task joins").expect("insert succeeds").is_inserted() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires database
async fn test_blank_identity_is_refused_by_schema(pool: PgPool) -> sqlx::Result<()> {
    let result = sqlx::query(
        "INSERT INTO version_records (product, region, version_name, build_id) VALUES ('wow', '', '1.0', '1')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
    Ok(())
}

// ============================================================================
// Query Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires database
async fn test_latest_per_region(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgVersionRepository::new(pool);
    repo.insert(&record("wow", "us", "1", 100)).await.expect("insert");
    repo.insert(&record("wow", "us", "2", 200)).await.expect("insert");
    repo.insert(&record("wow", "eu", "3", 150)).await.expect("insert");
    repo.insert(&record("wowt", "us", "9", 999)).await.expect("insert");

    let latest = repo.latest_per_region("wow").await.expect("query");
    assert_eq!(latest.len(), 2);
    assert_eq!(latest["us"].build_id, "2");
    assert_eq!(latest["eu"].build_id, "3");

    assert!(repo.latest_per_region("nope").await.expect("query").is_empty());
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires database
async fn test_equal_timestamps_prefer_highest_id(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgVersionRepository::new(pool);
    repo.insert(&record("wow", "kr", "a", 500)).await.expect("insert");
    repo.insert(&record("wow", "kr", "b", 500)).await.expect("insert");

    for _ in 0..3 {
        let latest = repo.latest_per_region("wow").await.expect("query");
        assert_eq!(latest["kr"].build_id, "b");
    }
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires database
async fn test_top_n_per_region(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgVersionRepository::new(pool);
    for (i, build) in ["1", "2", "3", "4", "5"].iter().enumerate() {
        repo.insert(&record("wow", "us", build, 10 * i as i64)).await.expect("insert");
    }
    repo.insert(&record("wow", "eu", "8", 1)).await.expect("insert");
    repo.insert(&record("wow", "eu", "9", 2)).await.expect("insert");

    let top = repo.top_n_per_region("wow", 3).await.expect("query");
    let us: Vec<&str> = top["us"].iter().map(|r| r.build_id.as_str()).collect();
    let eu: Vec<&str> = top["eu"].iter().map(|r| r.build_id.as_str()).collect();
    assert_eq!(us, vec!["5", "4", "3"]);
    assert_eq!(eu, vec!["9", "8"]);

    assert!(repo.top_n_per_region("wow", 0).await.expect("query").is_empty());
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires database
async fn test_distinct_products(pool: PgPool) -> sqlx::Result<()> {
    let repo = PgVersionRepository::new(pool);
    assert!(repo.distinct_products().await.expect("query").is_empty());

    repo.insert(&record("wow", "us", "1", 1)).await.expect("insert");
    repo.insert(&record("wow", "eu", "1", 1)).await.expect("insert");
    repo.insert(&record("wow_classic", "us", "2", 1)).await.expect("insert");

    let products: Vec<String> = repo.distinct_products().await.expect("query").into_iter().collect();
    assert_eq!(products, vec!["wow".to_string(), "wow_classic".to_string()]);
    Ok(())
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore] // Requires database
async fn test_pipeline_is_idempotent_against_postgres(pool: PgPool) -> sqlx::Result<()> {
    let repo = Arc::new(PgVersionRepository::new(pool));
    let pipeline = IngestPipeline::new(repo.clone());
    let rows: Vec<ParsedFieldRow> = [("us", "56461"), ("eu", "56461")]
        .iter()
        .map(|(region, build)| {
            [
                ("Region", *region),
                ("VersionsName", "11.0.2.56461"),
                ("BuildId", *build),
                ("BuildConfig", "cfg"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
        })
        .collect();

    let first = pipeline.ingest("wow", &rows).await.expect("ingest");
    let second = pipeline.ingest("wow", &rows).await.expect("ingest");

    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped_existing, 2);
    assert_eq!(repo.latest_per_region("wow").await.expect("query").len(), 2);
    Ok(())
}
