use std::collections::BTreeMap;
use std::sync::Arc;

use azmon_resource_store::{MetricDefinition, Resource, ResourceBatch, ResourceStore};
use futures::future::{join, join_all};
use metrics::counter;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{Aggregation, MetricResult, MetricValues, MetricsQuerier, QueryWindow};
use crate::config::ScraperConfig;
use crate::errors::{Result, ScraperError};
use crate::query_plan::{plan_queries, BatchQuery, QueryPlan, ResourceQuery};
use crate::scraper_metrics::BATCH_QUERY_TOTAL;

const METADATA_PREFIX: &str = "metadata_";
const TAGS_PREFIX: &str = "tags_";

/// One value of one aggregation, ready for emission.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub resource_id: String,
    pub namespace: String,
    pub name: String,
    pub unit: Option<String>,
    pub aggregation: Aggregation,
    pub timestamp: u64,
    pub value: f64,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub points: Vec<MetricPoint>,
    /// Failed requests; the other requests still contributed points.
    pub errors: Vec<ScraperError>,
    pub requests: usize,
    /// Returned metrics without a matching cached definition.
    pub unmatched: usize,
}

/// Turns the cached resources and definitions into metric points.
pub struct MetricsScraper {
    store: ResourceStore,
    querier: Arc<dyn MetricsQuerier>,
    config: Arc<ScraperConfig>,
    permits: Arc<Semaphore>,
}

impl MetricsScraper {
    pub fn new(
        store: ResourceStore,
        querier: Arc<dyn MetricsQuerier>,
        config: Arc<ScraperConfig>,
    ) -> Self {
        MetricsScraper {
            store,
            querier,
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            config,
        }
    }

    /// Plans and runs every query for the last complete time grain.
    pub async fn scrape(&self, cancel: &CancellationToken) -> Result<ScrapeReport> {
        let plan = plan_queries(&self.store, &self.config.limits);
        let window = QueryWindow::ending_now(self.config.time_grain);
        self.execute(&plan, &window, cancel).await
    }

    /// Runs all requests of `plan` concurrently. A failed request is recorded
    /// in the report and does not stop the others.
    pub async fn execute(
        &self,
        plan: &QueryPlan,
        window: &QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<ScrapeReport> {
        let batch_calls = join_all(plan.batches.iter().map(|q| self.run_batch(q, window)));
        let resource_calls = join_all(plan.resources.iter().map(|q| self.run_resource(q, window)));

        let (batch_results, resource_results) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScraperError::Cancelled),
            results = join(batch_calls, resource_calls) => results,
        };

        let mut report = ScrapeReport {
            requests: plan.len(),
            ..Default::default()
        };
        for result in batch_results {
            match result {
                Ok(values) => values.iter().for_each(|v| self.emit(v, &mut report)),
                Err(e) => report.errors.push(e),
            }
        }
        for result in resource_results {
            match result {
                Ok(values) => self.emit(&values, &mut report),
                Err(e) => report.errors.push(e),
            }
        }

        debug!(
            requests = report.requests,
            points = report.points.len(),
            failed = report.errors.len(),
            unmatched = report.unmatched,
            "scrape finished"
        );
        Ok(report)
    }

    async fn run_batch(&self, query: &BatchQuery, window: &QueryWindow) -> Result<Vec<MetricValues>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ScraperError::Cancelled)?;
        let result = self.querier.query_batch(query, window).await;
        if let Err(e) = &result {
            warn!(
                resource_type = %query.resource_type,
                namespace = %query.namespace,
                location = %query.location,
                resources = query.resource_ids.len(),
                error = %e,
                "batch metrics query failed"
            );
        }
        record_query("batch", result.is_ok());
        result
    }

    async fn run_resource(&self, query: &ResourceQuery, window: &QueryWindow) -> Result<MetricValues> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ScraperError::Cancelled)?;
        let result = self.querier.query_resource(query, window).await;
        if let Err(e) = &result {
            warn!(
                resource_id = %query.resource_id,
                namespace = %query.namespace,
                error = %e,
                "resource metrics query failed"
            );
        }
        record_query("resource", result.is_ok());
        result
    }

    // Shared namespace definitions first, then the resource's own.
    fn emit(&self, values: &MetricValues, report: &mut ScrapeReport) {
        let append_tags = self.config.append_tags_as_attributes;
        let matched = self.store.with_batch(&values.resource_id, |batch| {
            let resource = batch.resource(&values.resource_id);
            let mut points = Vec::new();
            let mut unmatched = 0;
            for metric in &values.metrics {
                match find_definition(batch, resource, &values.namespace, &metric.name) {
                    Some(definition) => points.extend(to_points(
                        values,
                        metric,
                        definition,
                        resource.filter(|_| append_tags),
                    )),
                    None => unmatched += 1,
                }
            }
            (points, unmatched)
        });

        let (points, unmatched) = matched.unwrap_or_else(|| (Vec::new(), values.metrics.len()));
        if unmatched > 0 {
            warn!(
                resource_id = %values.resource_id,
                namespace = %values.namespace,
                unmatched,
                "dropping metrics without a cached definition"
            );
        }
        report.points.extend(points);
        report.unmatched += unmatched;
    }
}

fn find_definition<'a>(
    batch: &'a ResourceBatch,
    resource: Option<&'a Resource>,
    namespace: &str,
    name: &str,
) -> Option<&'a MetricDefinition> {
    batch.get_definition(namespace, name).or_else(|| {
        resource
            .and_then(|r| r.get_definition(name))
            .filter(|d| d.namespace.as_deref() == Some(namespace))
    })
}

fn to_points(
    values: &MetricValues,
    metric: &MetricResult,
    definition: &MetricDefinition,
    tagged: Option<&Resource>,
) -> Vec<MetricPoint> {
    let unit = definition.unit.clone().or_else(|| metric.unit.clone());
    let mut points = Vec::new();
    for series in &metric.timeseries {
        let mut attributes: BTreeMap<String, String> = series
            .metadata
            .iter()
            .map(|(k, v)| (format!("{}{}", METADATA_PREFIX, k), v.clone()))
            .collect();
        if let Some(resource) = tagged {
            attributes.extend(
                resource
                    .tags
                    .iter()
                    .map(|(k, v)| (format!("{}{}", TAGS_PREFIX, k), v.clone())),
            );
        }

        for data in &series.data {
            for (aggregation, value) in data.values() {
                points.push(MetricPoint {
                    resource_id: values.resource_id.clone(),
                    namespace: values.namespace.clone(),
                    name: metric.name.clone(),
                    unit: unit.clone(),
                    aggregation,
                    timestamp: data.timestamp,
                    value,
                    attributes: attributes.clone(),
                });
            }
        }
    }
    points
}

fn record_query(kind: &'static str, ok: bool) {
    let result = if ok { "success" } else { "error" };
    counter!(BATCH_QUERY_TOTAL.name, "kind" => kind, "result" => result).increment(1);
}
