//! Periodic multi-product poller
//!
//! One background task repeats: fetch every product concurrently, ingest each
//! result, sleep. States move `Idle → Fetching → Ingesting → Sleeping →
//! Fetching …` and end in `Stopped` only when the handle asks for it.
//!
//! Cancellation is observed before a cycle starts and while sleeping. A cycle
//! that is already running finishes its in-flight fetches and ingests them;
//! fetches are spawned tasks and are never aborted mid-request.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, instrument, warn};

use crate::ingest::{IngestPipeline, IngestStats};
use crate::protocol::{FetchKind, FetchOutcome, VersionSource};

/// Where the poller is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Fetching,
    Ingesting,
    Sleeping,
    Stopped,
}

/// What one product contributed to a cycle
#[derive(Debug, Clone)]
pub struct ProductReport {
    pub product: String,
    /// `None` when the fetch task itself died
    pub fetch: Option<FetchKind>,
    pub ingest: Option<IngestStats>,
    pub storage_error: Option<String>,
}

/// Summary of one fetch-and-ingest pass
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub products: Vec<ProductReport>,
}

impl CycleReport {
    pub fn totals(&self) -> IngestStats {
        let mut totals = IngestStats::default();
        for stats in self.products.iter().filter_map(|p| p.ingest) {
            totals.merge(stats);
        }
        totals
    }

    /// Products whose fetch failed rather than legitimately returning nothing
    pub fn unavailable(&self) -> Vec<&str> {
        self.products
            .iter()
            .filter(|p| matches!(p.fetch, None | Some(FetchKind::Unavailable)))
            .map(|p| p.product.as_str())
            .collect()
    }

    pub fn storage_failures(&self) -> usize {
        self.products.iter().filter(|p| p.storage_error.is_some()).count()
    }

    pub fn product(&self, product: &str) -> Option<&ProductReport> {
        self.products.iter().find(|p| p.product == product)
    }
}

/// Drives fetch and ingest across a fixed product list
pub struct PollScheduler {
    source: Arc<dyn VersionSource>,
    pipeline: IngestPipeline,
    products: Vec<String>,
    interval: Duration,
    state: watch::Sender<PollState>,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn VersionSource>,
        pipeline: IngestPipeline,
        products: Vec<String>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            source,
            pipeline,
            products,
            interval,
            state,
        }
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: PollState) {
        self.state.send_replace(state);
    }

    /// Run exactly one fetch-and-ingest pass over every product
    ///
    /// Never fails: fetch problems degrade to empty results and storage errors
    /// are recorded per product.
    #[instrument(skip(self), fields(product_count = self.products.len()))]
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();

        self.set_state(PollState::Fetching);
        let fetches = self.products.iter().map(|product| {
            let source = Arc::clone(&self.source);
            let product = product.clone();
            tokio::spawn(async move { source.fetch_versions(&product).await })
        });
        let outcomes = join_all(fetches).await;

        self.set_state(PollState::Ingesting);
        let mut products = Vec::with_capacity(self.products.len());
        for (product, outcome) in self.products.iter().zip(outcomes) {
            let outcome = match outcome {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!(product = %product, error = %e, "Fetch task failed");
                    None
                },
            };
            products.push(self.ingest_outcome(product, outcome).await);
        }

        CycleReport {
            started_at,
            completed_at: Utc::now(),
            products,
        }
    }

    async fn ingest_outcome(&self, product: &str, outcome: Option<FetchOutcome>) -> ProductReport {
        let fetch = outcome.as_ref().map(FetchOutcome::kind);
        let rows = outcome.map(FetchOutcome::into_rows).unwrap_or_default();

        let (ingest, storage_error) = match self.pipeline.ingest(product, &rows).await {
            Ok(stats) => (Some(stats), None),
            Err(e) => {
                error!(product, error = %e, "Ingest failed, will retry next cycle");
                (None, Some(e.to_string()))
            },
        };

        ProductReport {
            product: product.to_string(),
            fetch,
            ingest,
            storage_error,
        }
    }

    /// Spawn the polling loop
    pub fn start(self) -> PollerHandle {
        let token = CancellationToken::new();
        let state = self.subscribe();
        let task = tokio::spawn(self.run(token.clone()));

        PollerHandle {
            token: token.clone(),
            _cancel_on_drop: token.drop_guard(),
            task,
            state,
        }
    }

    async fn run(self, token: CancellationToken) {
        info!(
            products = self.products.len(),
            interval_secs = self.interval.as_secs(),
            "Starting periodic version check"
        );

        while !token.is_cancelled() {
            let report = self.run_cycle().await;
            let totals = report.totals();
            let unavailable = report.unavailable();
            if !unavailable.is_empty() {
                warn!(products = ?unavailable, "Some products could not be fetched this cycle");
            }
            info!(
                inserted = totals.inserted,
                rows_seen = totals.rows_seen,
                storage_failures = report.storage_failures(),
                sleep_secs = self.interval.as_secs(),
                "Version check finished"
            );

            self.set_state(PollState::Sleeping);
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {},
            }
        }

        self.set_state(PollState::Stopped);
        info!("Periodic version check stopped");
    }
}

/// Owner of a running poller
///
/// Dropping the handle cancels the loop the same way [`PollerHandle::request_stop`] does.
pub struct PollerHandle {
    token: CancellationToken,
    _cancel_on_drop: DropGuard,
    task: JoinHandle<()>,
    state: watch::Receiver<PollState>,
}

impl PollerHandle {
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop without waiting for it
    pub fn request_stop(&self) {
        self.token.cancel();
    }

    /// Ask the loop to stop and wait until it has
    ///
    /// Returns after any in-flight cycle has finished ingesting.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Poller task ended abnormally");
        }
    }
}
