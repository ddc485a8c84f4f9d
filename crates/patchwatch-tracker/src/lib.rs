//! Patchwatch Tracker Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Discovers and records game client versions published by the upstream
//! patch server.
//!
//! # Overview
//!
//! - **Protocol**: fetch `<base_url>/<product>/versions` and parse the
//!   pipe-delimited table into rows
//! - **Ingest**: turn rows into records and store only unseen
//!   `(product, region, version, build)` keys
//! - **Repository**: append-only history in PostgreSQL (or in memory), with
//!   latest-per-region and top-N queries
//! - **Scheduler**: a cancellable background loop polling every product
//!   concurrently
//! - **Tracker**: the facade tying the above together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use patchwatch_tracker::{
//!     InMemoryVersionRepository, ProtocolClient, TrackerConfig, VersionTracker,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = TrackerConfig::load()?;
//! let tracker = VersionTracker::new(
//!     Arc::new(InMemoryVersionRepository::new()),
//!     Arc::new(ProtocolClient::new(&config.upstream)?),
//!     config.polling.top_n,
//! );
//!
//! tracker
//!     .start_polling(config.polling.products.clone(), config.polling.interval())
//!     .await?;
//! let latest = tracker.get_latest_per_region("wow").await?;
//! tracker.stop_polling().await;
//! # let _ = latest;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod protocol;
pub mod repository;
pub mod scheduler;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use ingest::{IngestPipeline, IngestStats};
pub use models::{ParsedFieldRow, VersionCandidate, VersionRecord};
pub use protocol::{FetchOutcome, ProtocolClient, VersionSource};
pub use repository::{
    InMemoryVersionRepository, PgVersionRepository, StorageError, VersionRepository,
};
pub use scheduler::{CycleReport, PollScheduler, PollState, PollerHandle};
pub use tracker::VersionTracker;
