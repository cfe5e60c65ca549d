#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use azmon_resource_store::{MetricDefinition, Resource};
use azmon_scraper::{
    BatchQuery, DataPoint, DefinitionLister, MetricResult, MetricValues, MetricsQuerier, Page,
    QueryWindow, ResourceLister, ResourceQuery, Result, ScraperConfig, ScraperError, TimeSeries,
};

pub const VM_TYPE: &str = "Microsoft.Compute/virtualMachines";
pub const DISK_TYPE: &str = "Microsoft.Compute/disks";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn config() -> Arc<ScraperConfig> {
    let mut config = ScraperConfig::new("sub-1");
    config.max_concurrent_requests = 2;
    Arc::new(config)
}

pub fn resource_id(resource_type: &str, name: &str) -> String {
    format!(
        "/subscriptions/sub-1/resourceGroups/rg-1/providers/{}/{}",
        resource_type, name
    )
}

pub fn vm(name: &str) -> Resource {
    Resource::new(resource_id(VM_TYPE, name), VM_TYPE)
        .with_name(name)
        .with_location("westeurope")
}

pub fn disk(name: &str) -> Resource {
    Resource::new(resource_id(DISK_TYPE, name), DISK_TYPE)
        .with_name(name)
        .with_location("westeurope")
}

/// Serves a mutable listing in pages of `page_size`.
pub struct FakeResourceLister {
    resources: Mutex<Vec<Resource>>,
    page_size: usize,
    fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeResourceLister {
    pub fn new(resources: Vec<Resource>, page_size: usize) -> Arc<Self> {
        Arc::new(FakeResourceLister {
            resources: Mutex::new(resources),
            page_size: page_size.max(1),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_resources(&self, resources: Vec<Resource>) {
        *self.resources.lock().unwrap() = resources;
    }

    /// Makes every page after the first fail.
    pub fn fail_after_first_page(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceLister for FakeResourceLister {
    async fn list_resources(&self, page_token: Option<String>) -> Result<Page<Resource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let offset: usize = page_token
            .as_deref()
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);
        if offset > 0 && self.fail.load(Ordering::SeqCst) {
            return Err(ScraperError::client("list resources", "503 service unavailable"));
        }

        let resources = self.resources.lock().unwrap();
        let end = (offset + self.page_size).min(resources.len());
        let items = resources[offset..end].to_vec();
        Ok(if end < resources.len() {
            Page::with_next(items, end.to_string())
        } else {
            Page::last(items)
        })
    }
}

type FetchHook = Box<dyn Fn(&str) + Send + Sync>;

/// Definitions per resource ID, with optional failures and a record of the
/// highest number of concurrent calls.
#[derive(Default)]
pub struct FakeDefinitionLister {
    definitions: Mutex<HashMap<String, Vec<MetricDefinition>>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    on_fetch: Mutex<Option<FetchHook>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeDefinitionLister {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(FakeDefinitionLister {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn set(&self, resource_id: &str, definitions: Vec<MetricDefinition>) {
        self.definitions
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), definitions);
    }

    pub fn fail_for(&self, resource_id: &str) {
        self.failing.lock().unwrap().insert(resource_id.to_string());
    }

    /// Runs `hook` with the resource ID while a fetch is in flight.
    pub fn on_fetch(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_fetch.lock().unwrap() = Some(Box::new(hook));
    }
}

#[async_trait]
impl DefinitionLister for FakeDefinitionLister {
    async fn list_definitions(
        &self,
        resource_id: &str,
        _page_token: Option<String>,
    ) -> Result<Page<MetricDefinition>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hook) = self.on_fetch.lock().unwrap().as_ref() {
            hook(resource_id);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(resource_id) {
            return Err(ScraperError::client("list definitions", "429 too many requests"));
        }
        let definitions = self
            .definitions
            .lock()
            .unwrap()
            .get(resource_id)
            .cloned()
            .unwrap_or_default();
        Ok(Page::last(definitions))
    }
}

/// Answers every requested metric with one average data point; namespaces
/// listed in `failing` return an error instead.
#[derive(Default)]
pub struct FakeQuerier {
    failing: Mutex<HashSet<String>>,
    pub batch_queries: Mutex<Vec<BatchQuery>>,
    pub resource_queries: Mutex<Vec<ResourceQuery>>,
}

impl FakeQuerier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_namespace(&self, namespace: &str) {
        self.failing.lock().unwrap().insert(namespace.to_string());
    }

    fn values(resource_id: &str, namespace: &str, names: &[String], window: &QueryWindow) -> MetricValues {
        MetricValues {
            resource_id: resource_id.to_string(),
            namespace: namespace.to_string(),
            metrics: names
                .iter()
                .map(|name| MetricResult {
                    name: name.clone(),
                    unit: Some("Count".to_string()),
                    timeseries: vec![TimeSeries {
                        metadata: [("lun".to_string(), "0".to_string())].into_iter().collect(),
                        data: vec![DataPoint {
                            timestamp: window.start,
                            average: Some(1.0),
                            ..Default::default()
                        }],
                    }],
                })
                .collect(),
        }
    }
}

#[async_trait]
impl MetricsQuerier for FakeQuerier {
    async fn query_batch(&self, query: &BatchQuery, window: &QueryWindow) -> Result<Vec<MetricValues>> {
        self.batch_queries.lock().unwrap().push(query.clone());
        if self.failing.lock().unwrap().contains(&query.namespace) {
            return Err(ScraperError::client("query batch", "400 bad request"));
        }
        Ok(query
            .resource_ids
            .iter()
            .map(|id| Self::values(id, &query.namespace, &query.metric_names, window))
            .collect())
    }

    async fn query_resource(&self, query: &ResourceQuery, window: &QueryWindow) -> Result<MetricValues> {
        self.resource_queries.lock().unwrap().push(query.clone());
        if self.failing.lock().unwrap().contains(&query.namespace) {
            return Err(ScraperError::client("query resource", "400 bad request"));
        }
        Ok(Self::values(
            &query.resource_id,
            &query.namespace,
            &query.metric_names,
            window,
        ))
    }
}
