use tracing::info;

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 4] = [
    CACHE_REFRESH_TOTAL,
    CACHE_STALE_EVICTED_TOTAL,
    DEFINITION_FETCH_FAILURES_TOTAL,
    BATCH_QUERY_TOTAL,
];
pub(crate) const GAUGES: [Metric; 1] = [CACHE_RESOURCES];
pub(crate) const HISTOGRAMS: [Metric; 1] = [CACHE_REFRESH_DURATION_SECONDS];

// CACHE Metrics --------------------------

pub(crate) const CACHE_REFRESH_TOTAL: Metric = Metric {
    name: "azmon_cache_refresh_total",
    description: "Total number of resource cache refresh cycles (result=success|error)",
};

pub(crate) const CACHE_REFRESH_DURATION_SECONDS: Metric = Metric {
    name: "azmon_cache_refresh_duration_seconds",
    description: "Duration of one resource cache refresh cycle",
};

pub(crate) const CACHE_RESOURCES: Metric = Metric {
    name: "azmon_cache_resources",
    description: "Number of resources held by the cache after the last refresh",
};

pub(crate) const CACHE_STALE_EVICTED_TOTAL: Metric = Metric {
    name: "azmon_cache_stale_evicted_total",
    description: "Total number of resources evicted because they vanished from the listing",
};

pub(crate) const DEFINITION_FETCH_FAILURES_TOTAL: Metric = Metric {
    name: "azmon_definition_fetch_failures_total",
    description: "Total number of failed per-resource metric definition fetches",
};

// QUERY Metrics --------------------------

pub(crate) const BATCH_QUERY_TOTAL: Metric = Metric {
    name: "azmon_batch_query_total",
    description: "Total number of metric value requests (kind=batch|resource, result=success|error)",
};

/// Describes every scraper metric to the installed recorder. Installing an
/// exporter is left to the embedding process.
pub fn register_metrics() {
    info!("registering scraper metrics");

    for metric in COUNTERS {
        register_counter(metric)
    }

    for metric in GAUGES {
        register_gauge(metric)
    }

    for metric in HISTOGRAMS {
        register_histogram(metric)
    }
}

fn register_counter(metric: Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

fn register_gauge(metric: Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

fn register_histogram(metric: Metric) {
    metrics::describe_histogram!(metric.name, metric.description);
    let _histogram = metrics::histogram!(metric.name);
}
