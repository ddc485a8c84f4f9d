//! Version tracker facade
//!
//! Ties the pieces together for callers: read queries go straight to the
//! repository, and at most one [`PollScheduler`] runs at a time behind
//! [`VersionTracker::start_polling`] / [`VersionTracker::stop_polling`].

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::error::{TrackerError, TrackerResult};
use crate::ingest::IngestPipeline;
use crate::protocol::VersionSource;
use crate::repository::{LatestByRegion, RecentByRegion, VersionRepository};
use crate::scheduler::{PollScheduler, PollState, PollerHandle};

/// Product listed first by [`VersionTracker::active_products`]
pub const PRIMARY_PRODUCT: &str = "wow";

pub struct VersionTracker {
    repository: Arc<dyn VersionRepository>,
    source: Arc<dyn VersionSource>,
    top_n: usize,
    poller: Mutex<Option<PollerHandle>>,
}

impl VersionTracker {
    /// `top_n` is the history depth used by [`Self::get_recent_per_region`]
    pub fn new(
        repository: Arc<dyn VersionRepository>,
        source: Arc<dyn VersionSource>,
        top_n: usize,
    ) -> Self {
        Self {
            repository,
            source,
            top_n,
            poller: Mutex::new(None),
        }
    }

    pub fn repository(&self) -> &Arc<dyn VersionRepository> {
        &self.repository
    }

    pub async fn get_latest_per_region(&self, product: &str) -> TrackerResult<LatestByRegion> {
        Ok(self.repository.latest_per_region(product).await?)
    }

    pub async fn get_top_n_per_region(
        &self,
        product: &str,
        n: usize,
    ) -> TrackerResult<RecentByRegion> {
        Ok(self.repository.top_n_per_region(product, n).await?)
    }

    /// Recent history per region using the configured depth
    pub async fn get_recent_per_region(&self, product: &str) -> TrackerResult<RecentByRegion> {
        self.get_top_n_per_region(product, self.top_n).await
    }

    pub async fn list_tracked_products(&self) -> TrackerResult<BTreeSet<String>> {
        Ok(self.repository.distinct_products().await?)
    }

    /// Spawn a poller over `products`
    ///
    /// Fails with [`TrackerError::AlreadyPolling`] while another poller is
    /// alive. A poller whose task has ended on its own is replaced.
    #[instrument(skip(self, products), fields(product_count = products.len()))]
    pub async fn start_polling(
        &self,
        products: Vec<String>,
        interval: Duration,
    ) -> TrackerResult<()> {
        if products.is_empty() {
            return Err(TrackerError::Config("no products to poll".to_string()));
        }
        if interval.is_zero() {
            return Err(TrackerError::Config("poll interval must be greater than 0".to_string()));
        }

        let mut poller = self.poller.lock().await;
        if poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(TrackerError::AlreadyPolling);
        }

        let scheduler = PollScheduler::new(
            Arc::clone(&self.source),
            IngestPipeline::new(Arc::clone(&self.repository)),
            products,
            interval,
        );
        *poller = Some(scheduler.start());

        info!("Polling started");
        Ok(())
    }

    /// Stop the running poller, waiting for any in-flight cycle
    ///
    /// Does nothing when no poller is running.
    pub async fn stop_polling(&self) {
        let handle = self.poller.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("Polling stopped");
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn poll_state(&self) -> Option<PollState> {
        self.poller.lock().await.as_ref().map(PollerHandle::state)
    }

    /// Candidates that currently return at least one row upstream
    ///
    /// Candidates are fetched concurrently. The result lists [`PRIMARY_PRODUCT`] first and
    /// the rest alphabetically.
    #[instrument(skip(self, candidates), fields(candidate_count = candidates.len()))]
    pub async fn active_products(&self, candidates: &[String]) -> Vec<String> {
        let checks = candidates.iter().map(|product| {
            let source = Arc::clone(&self.source);
            async move { (product, source.fetch_versions(product).await.has_rows()) }
        });

        let mut active: Vec<String> = join_all(checks)
            .await
            .into_iter()
            .filter(|(_, has_rows)| *has_rows)
            .map(|(product, _)| product.clone())
            .collect();

        active.sort_by(|a, b| {
            (a != PRIMARY_PRODUCT)
                .cmp(&(b != PRIMARY_PRODUCT))
                .then_with(|| a.cmp(b))
        });
        active.dedup();
        active
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ParsedFieldRow;
    use crate::protocol::FetchOutcome;
    use crate::repository::InMemoryVersionRepository;
    use async_trait::async_trait;

    /// Returns one row for products in `live`, nothing for the rest
    struct LiveSource {
        live: Vec<&'static str>,
    }

    #[async_trait]
    impl VersionSource for LiveSource {
        async fn fetch_versions(&self, product: &str) -> FetchOutcome {
            if !self.live.iter().any(|live| *live == product) {
                return FetchOutcome::NotFound;
            }
            FetchOutcome::Rows(vec![[
                ("Region", "us"),
                ("VersionsName", "1.0.0.1"),
                ("BuildId", "1"),
                ("BuildConfig", "cfg"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<ParsedFieldRow>()])
        }
    }

    fn tracker(live: Vec<&'static str>) -> (Arc<InMemoryVersionRepository>, VersionTracker) {
        let repo = Arc::new(InMemoryVersionRepository::new());
        let tracker = VersionTracker::new(repo.clone(), Arc::new(LiveSource { live }), 3);
        (repo, tracker)
    }

    #[tokio::test]
    async fn test_active_products_lists_primary_first() {
        let (_, tracker) = tracker(vec!["wowt", "wow_classic", "wow"]);
        let candidates: Vec<String> = ["wow_classic", "wowdev", "wowt", "wow"]
            .iter()
            .map(|p| p.to_string())
            .collect();

        let active = tracker.active_products(&candidates).await;
        assert_eq!(active, vec!["wow", "wow_classic", "wowt"]);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_until_stopped() {
        let (_, tracker) = tracker(vec!["wow"]);
        let products = vec!["wow".to_string()];
        let interval = Duration::from_secs(3600);

        tracker.start_polling(products.clone(), interval).await.unwrap();
        assert!(matches!(
            tracker.start_polling(products.clone(), interval).await,
            Err(TrackerError::AlreadyPolling)
        ));

        tracker.stop_polling().await;
        assert!(!tracker.is_polling().await);
        tracker.start_polling(products, interval).await.unwrap();
        tracker.stop_polling().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_no_op() {
        let (_, tracker) = tracker(vec![]);
        tracker.stop_polling().await;
        assert!(tracker.poll_state().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_poll_arguments_are_rejected() {
        let (_, tracker) = tracker(vec![]);
        assert!(matches!(
            tracker.start_polling(Vec::new(), Duration::from_secs(1)).await,
            Err(TrackerError::Config(_))
        ));
        assert!(matches!(
            tracker.start_polling(vec!["wow".into()], Duration::ZERO).await,
            Err(TrackerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_queries_surface_storage_errors() {
        let (repo, tracker) = tracker(vec![]);
        repo.set_unavailable(true);

        assert!(matches!(
            tracker.get_latest_per_region("wow").await,
            Err(TrackerError::Storage(_))
        ));
        assert!(tracker.list_tracked_products().await.is_err());
    }
}
