use std::collections::{BTreeMap, BTreeSet};

use azmon_resource_store::{Resource, ResourceBatch, ResourceId, ResourceStore};
use tracing::debug;

use crate::config::{MAX_METRICS_PER_CALL, MAX_RESOURCES_PER_CALL};

/// Request size limits of the batch metrics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub max_metrics_per_call: usize,
    pub max_resources_per_call: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        QueryLimits {
            max_metrics_per_call: MAX_METRICS_PER_CALL,
            max_resources_per_call: MAX_RESOURCES_PER_CALL,
        }
    }
}

/// One batch metrics request: resources sharing type, subscription and
/// location, metrics of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery {
    pub resource_type: String,
    pub subscription_id: String,
    pub location: String,
    pub namespace: String,
    pub metric_names: Vec<String>,
    pub aggregations: Vec<String>,
    pub resource_ids: Vec<String>,
}

/// One per-resource request for a custom namespace the batch API cannot serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
    pub resource_id: String,
    pub namespace: String,
    pub metric_names: Vec<String>,
    pub aggregations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPlan {
    pub batches: Vec<BatchQuery>,
    pub resources: Vec<ResourceQuery>,
}

impl QueryPlan {
    pub fn len(&self) -> usize {
        self.batches.len() + self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.resources.is_empty()
    }
}

/// Builds every request needed to scrape the current content of `store`.
///
/// Types without resources produce nothing. Requests are sorted so equal
/// store content always yields the same plan.
pub fn plan_queries(store: &ResourceStore, limits: &QueryLimits) -> QueryPlan {
    let max_metrics = limits.max_metrics_per_call.max(1);
    let max_resources = limits.max_resources_per_call.max(1);
    let mut plan = QueryPlan::default();

    store.range(|_, batch| {
        if !batch.is_empty() {
            plan_batch(batch, max_metrics, max_resources, &mut plan);
        }
        true
    });

    plan.batches.sort_by(|a, b| {
        (&a.resource_type, &a.subscription_id, &a.location, &a.namespace, &a.metric_names)
            .cmp(&(&b.resource_type, &b.subscription_id, &b.location, &b.namespace, &b.metric_names))
            .then_with(|| a.resource_ids.cmp(&b.resource_ids))
    });
    plan.resources.sort_by(|a, b| {
        (&a.resource_id, &a.namespace, &a.metric_names)
            .cmp(&(&b.resource_id, &b.namespace, &b.metric_names))
    });

    debug!(
        batch_queries = plan.batches.len(),
        resource_queries = plan.resources.len(),
        "planned metric queries"
    );
    plan
}

fn plan_batch(batch: &ResourceBatch, max_metrics: usize, max_resources: usize, plan: &mut QueryPlan) {
    let resource_type = batch.resource_type().to_string();

    // (subscription, location) -> resource IDs
    let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    batch.range(|id, resource| {
        let subscription = ResourceId::parse(id)
            .ok()
            .and_then(|parsed| parsed.subscription_id().map(str::to_string))
            .unwrap_or_default();
        let location = resource.location.clone().unwrap_or_default();
        groups
            .entry((subscription, location))
            .or_default()
            .push(id.to_string());

        if resource.has_definitions() {
            plan_resource(id, resource, max_metrics, plan);
        }
        true
    });

    for (namespace, metrics) in batch.definitions() {
        let names: Vec<String> = metrics.keys().cloned().collect();
        for name_chunk in names.chunks(max_metrics) {
            let aggregations = collect_aggregations(
                name_chunk
                    .iter()
                    .filter_map(|name| metrics.get(name))
                    .flat_map(|def| def.supported_aggregation_types.iter()),
            );
            for ((subscription, location), ids) in &groups {
                for id_chunk in ids.chunks(max_resources) {
                    plan.batches.push(BatchQuery {
                        resource_type: resource_type.clone(),
                        subscription_id: subscription.clone(),
                        location: location.clone(),
                        namespace: namespace.clone(),
                        metric_names: name_chunk.to_vec(),
                        aggregations: aggregations.clone(),
                        resource_ids: id_chunk.to_vec(),
                    });
                }
            }
        }
    }
}

fn plan_resource(
    resource_id: &str,
    resource: &Resource,
    max_metrics: usize,
    plan: &mut QueryPlan,
) {
    let Some(definitions) = resource.definitions() else {
        return;
    };

    // namespace -> (metric name, supported aggregations)
    let mut by_namespace: BTreeMap<&str, Vec<(&str, &[String])>> = BTreeMap::new();
    for (key, def) in definitions {
        let Some(namespace) = def.namespace.as_deref() else {
            continue;
        };
        let name = def.name.as_deref().unwrap_or(key.as_str());
        by_namespace
            .entry(namespace)
            .or_default()
            .push((name, def.supported_aggregation_types.as_slice()));
    }

    for (namespace, metrics) in by_namespace {
        for chunk in metrics.chunks(max_metrics) {
            plan.resources.push(ResourceQuery {
                resource_id: resource_id.to_string(),
                namespace: namespace.to_string(),
                metric_names: chunk.iter().map(|(name, _)| name.to_string()).collect(),
                aggregations: collect_aggregations(chunk.iter().flat_map(|(_, aggs)| aggs.iter())),
            });
        }
    }
}

fn collect_aggregations<'a>(aggregations: impl Iterator<Item = &'a String>) -> Vec<String> {
    aggregations
        .cloned()
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}
