use std::sync::Arc;
use std::time::Instant;

use azmon_resource_store::{MetricDefinition, Resource, ResourceId, ResourceStore};
use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{collect_pages, DefinitionLister, ResourceLister};
use crate::config::ScraperConfig;
use crate::errors::{Result, ScraperError};
use crate::scraper_metrics::{
    CACHE_REFRESH_DURATION_SECONDS, CACHE_REFRESH_TOTAL, CACHE_RESOURCES,
    CACHE_STALE_EVICTED_TOTAL, DEFINITION_FETCH_FAILURES_TOTAL,
};

/// Phase of the refresh cycle currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Listing,
    Enriching,
    Reconciled,
}

/// What one refresh cycle did to the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Resources returned by the listing.
    pub listed: usize,
    /// Resources stored or refreshed in the cache.
    pub stored: usize,
    /// Listed resources that were not accepted.
    pub rejected: usize,
    /// Stale resources removed at the end of the cycle.
    pub evicted: usize,
    /// Definitions stored, shared and per-resource together.
    pub definitions_stored: usize,
    /// Resources whose definitions could not be fetched.
    pub fetch_failures: usize,
}

/// Keeps the [`ResourceStore`] in line with the resource listing.
///
/// Each cycle lists every resource, reconciles the store against the listing,
/// fetches the definitions of every listed resource and finally evicts the
/// resources the listing no longer contains. A failed listing abandons the
/// cycle before the store is touched.
pub struct CacheUpdater {
    store: ResourceStore,
    resources: Arc<dyn ResourceLister>,
    definitions: Arc<dyn DefinitionLister>,
    config: Arc<ScraperConfig>,
    fetch_permits: Arc<Semaphore>,
    state_tx: watch::Sender<CycleState>,
}

impl CacheUpdater {
    pub fn new(
        store: ResourceStore,
        resources: Arc<dyn ResourceLister>,
        definitions: Arc<dyn DefinitionLister>,
        config: Arc<ScraperConfig>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CycleState::Idle);
        CacheUpdater {
            store,
            resources,
            definitions,
            fetch_permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            config,
            state_tx,
        }
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Receiver of the cycle phase, for readiness checks and tests.
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> CycleState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: CycleState) {
        self.state_tx.send_replace(state);
    }

    /// Spawns the refresh loop: one cycle right away, then one per
    /// `cache_resources` interval. Cycles run inline, so a slow cycle delays
    /// the next tick instead of overlapping with it.
    pub fn start_with_cancel(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                subscription_id = %self.config.subscription_id,
                interval_secs = self.config.cache_resources.as_secs(),
                "resource cache updater started"
            );

            self.run_logged(&cancel).await;

            let period = self.config.cache_resources;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("resource cache updater stopped (cancel)");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_logged(&cancel).await;
                    }
                }
            }
        })
    }

    async fn run_logged(&self, cancel: &CancellationToken) {
        match self.run_once(cancel).await {
            Ok(report) => info!(
                listed = report.listed,
                stored = report.stored,
                rejected = report.rejected,
                evicted = report.evicted,
                definitions = report.definitions_stored,
                fetch_failures = report.fetch_failures,
                "resource cache refreshed"
            ),
            Err(ScraperError::Cancelled) => debug!("resource cache refresh cancelled"),
            Err(e) => error!(error = %e, "resource cache refresh failed, retrying next tick"),
        }
    }

    /// Runs one Listing, Enriching, Reconciled cycle.
    ///
    /// Cancellation leaves the store in whatever state the cycle reached; the
    /// next cycle's reconciliation repairs it.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RefreshReport> {
        let started = Instant::now();
        let result = self.refresh(cancel).await;
        self.set_state(CycleState::Idle);

        let outcome = if result.is_ok() { "success" } else { "error" };
        counter!(CACHE_REFRESH_TOTAL.name, "result" => outcome).increment(1);
        histogram!(CACHE_REFRESH_DURATION_SECONDS.name).record(started.elapsed().as_secs_f64());
        result
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        self.set_state(CycleState::Listing);
        let lister = self.resources.as_ref();
        let listed = collect_pages(cancel, move |token| lister.list_resources(token)).await?;
        report.listed = listed.len();

        self.set_state(CycleState::Enriching);
        let resources: Vec<Resource> = listed.into_iter().filter(routable).collect();
        report.rejected = report.listed - resources.len();
        let resource_ids: Vec<String> = resources
            .iter()
            .filter_map(|r| r.id().map(str::to_string))
            .collect();

        let reconciliation = self.store.store_resources(resources)?;
        report.stored = reconciliation.stored;
        report.rejected += reconciliation.errors.len();
        for err in &reconciliation.errors {
            warn!(error = %err, "resource rejected by the cache");
        }

        let fetches = resource_ids
            .iter()
            .filter(|id| self.store.contains_resource(id))
            .map(|id| self.enrich(id, cancel));
        for fetched in join_all(fetches).await {
            match fetched {
                Ok(stored) => report.definitions_stored += stored,
                Err(ScraperError::Cancelled) => return Err(ScraperError::Cancelled),
                Err(_) => report.fetch_failures += 1,
            }
        }
        if cancel.is_cancelled() {
            return Err(ScraperError::Cancelled);
        }

        let evicted = self.store.delete_resources(reconciliation.stale.iter());
        for err in &evicted.errors {
            // a concurrent writer may have removed it already
            debug!(error = %err, "stale resource already gone");
        }
        report.evicted = evicted.stored;
        counter!(CACHE_STALE_EVICTED_TOTAL.name).increment(report.evicted as u64);
        gauge!(CACHE_RESOURCES.name).set(self.store.resource_count() as f64);
        self.set_state(CycleState::Reconciled);

        Ok(report)
    }

    /// Fetches the definitions of one resource and stores them: platform
    /// metrics in the shared batch map, custom namespaces on the resource,
    /// replacing whatever the resource held before.
    async fn enrich(&self, resource_id: &str, cancel: &CancellationToken) -> Result<usize> {
        let _permit = self
            .fetch_permits
            .acquire()
            .await
            .map_err(|_| ScraperError::Cancelled)?;

        let lister = self.definitions.as_ref();
        let fetched = collect_pages(cancel, move |token| lister.list_definitions(resource_id, token)).await;
        let definitions = match fetched {
            Ok(definitions) => definitions,
            Err(ScraperError::Cancelled) => return Err(ScraperError::Cancelled),
            Err(e) => {
                warn!(resource_id = %resource_id, error = %e, "failed to fetch metric definitions");
                counter!(DEFINITION_FETCH_FAILURES_TOTAL.name).increment(1);
                return Err(e);
            }
        };

        let (platform, custom): (Vec<MetricDefinition>, Vec<MetricDefinition>) =
            definitions.into_iter().partition(MetricDefinition::is_platform_metric);

        let mut stored = 0;
        if !platform.is_empty() {
            match self.store.store_definitions(&platform) {
                Ok(outcome) => stored += outcome.stored,
                Err(e) => warn!(resource_id = %resource_id, error = %e, "platform metric definitions rejected"),
            }
        }
        // the fetch is the full custom set: metrics gone upstream are dropped
        match self.store.replace_resource_definitions(resource_id, &custom) {
            Ok(outcome) => {
                for err in &outcome.errors {
                    warn!(resource_id = %resource_id, error = %err, "custom metric definition rejected");
                }
                stored += outcome.stored;
            }
            Err(e) => {
                warn!(resource_id = %resource_id, error = %e, "resource left the cache before its custom definitions were stored");
            }
        }
        Ok(stored)
    }
}

// The store fails a whole listing on one unroutable ID, so those are dropped here.
fn routable(resource: &Resource) -> bool {
    match resource.id().map(ResourceId::parse) {
        Some(Ok(_)) => true,
        Some(Err(e)) => {
            warn!(error = %e, "skipping resource with unparsable ID");
            false
        }
        None => {
            warn!(name = ?resource.name, "skipping resource without ID");
            false
        }
    }
}
