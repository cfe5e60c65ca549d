use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use azmon_resource_store::{MetricDefinition, Resource};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::TimeGrain;
use crate::errors::{Result, ScraperError};
use crate::query_plan::{BatchQuery, ResourceQuery};

/// One page of a listing, plus the token of the following page if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Page {
            items,
            next_page: None,
        }
    }

    pub fn with_next(items: Vec<T>, next_page: impl Into<String>) -> Self {
        Page {
            items,
            next_page: Some(next_page.into()),
        }
    }
}

/// Lists every resource of the configured subscription.
#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn list_resources(&self, page_token: Option<String>) -> Result<Page<Resource>>;
}

/// Lists the metric definitions available for one resource.
#[async_trait]
pub trait DefinitionLister: Send + Sync {
    async fn list_definitions(
        &self,
        resource_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<MetricDefinition>>;
}

/// Fetches metric values, either for many resources of one type at once or
/// for a single resource.
#[async_trait]
pub trait MetricsQuerier: Send + Sync {
    async fn query_batch(
        &self,
        query: &BatchQuery,
        window: &QueryWindow,
    ) -> Result<Vec<MetricValues>>;

    async fn query_resource(
        &self,
        query: &ResourceQuery,
        window: &QueryWindow,
    ) -> Result<MetricValues>;
}

/// Follows page tokens until the listing is exhausted.
///
/// Any page error fails the whole listing; a cancelled token stops it between
/// or during page fetches. No partial result is returned in either case.
pub async fn collect_pages<T, F, Fut>(cancel: &CancellationToken, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut page_token = None;
    loop {
        if cancel.is_cancelled() {
            return Err(ScraperError::Cancelled);
        }
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScraperError::Cancelled),
            page = fetch(page_token.take()) => page?,
        };
        items.extend(page.items);
        match page.next_page {
            Some(next) if !next.is_empty() => page_token = Some(next),
            _ => return Ok(items),
        }
    }
}

/// Time range and granularity of a metrics query, in unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: u64,
    pub end: u64,
    pub time_grain: TimeGrain,
}

impl QueryWindow {
    /// The last complete `time_grain` interval before `now`.
    pub fn ending_at(now: SystemTime, time_grain: TimeGrain) -> Self {
        let grain = time_grain.duration().as_secs().max(1);
        let now = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let end = now - now % grain;
        QueryWindow {
            start: end.saturating_sub(grain),
            end,
            time_grain,
        }
    }

    pub fn ending_now(time_grain: TimeGrain) -> Self {
        Self::ending_at(SystemTime::now(), time_grain)
    }
}

/// Query answer for one resource and namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValues {
    pub resource_id: String,
    pub namespace: String,
    #[serde(default)]
    pub metrics: Vec<MetricResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricResult {
    pub name: String,
    pub unit: Option<String>,
    #[serde(default)]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    /// Dimension name to dimension value.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub timestamp: u64,
    pub average: Option<f64>,
    pub count: Option<f64>,
    pub maximum: Option<f64>,
    pub minimum: Option<f64>,
    pub total: Option<f64>,
}

impl DataPoint {
    /// Aggregations carried by this point, in a fixed order.
    pub fn values(&self) -> impl Iterator<Item = (Aggregation, f64)> + '_ {
        Aggregation::ALL
            .into_iter()
            .filter_map(move |aggregation| aggregation.value_of(self).map(|v| (aggregation, v)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Aggregation {
    Average,
    Count,
    Maximum,
    Minimum,
    Total,
}

impl Aggregation {
    pub const ALL: [Aggregation; 5] = [
        Aggregation::Average,
        Aggregation::Count,
        Aggregation::Maximum,
        Aggregation::Minimum,
        Aggregation::Total,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "Average",
            Aggregation::Count => "Count",
            Aggregation::Maximum => "Maximum",
            Aggregation::Minimum => "Minimum",
            Aggregation::Total => "Total",
        }
    }

    fn value_of(&self, point: &DataPoint) -> Option<f64> {
        match self {
            Aggregation::Average => point.average,
            Aggregation::Count => point.count,
            Aggregation::Maximum => point.maximum,
            Aggregation::Minimum => point.minimum,
            Aggregation::Total => point.total,
        }
    }
}
