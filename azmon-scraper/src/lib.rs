//! Scrape loop around the resource cache: keeps the cache in line with the
//! resource listing, plans batch metric queries from it and matches the
//! returned values back to their definitions.

pub mod errors;
pub use errors::{Result, ScraperError};

pub mod config;
pub use config::{LoadConfiguration, ScraperConfig, TimeGrain};

pub mod client;
pub use client::{
    collect_pages, Aggregation, DataPoint, DefinitionLister, MetricResult, MetricValues,
    MetricsQuerier, Page, QueryWindow, ResourceLister, TimeSeries,
};

mod scraper_metrics;
pub use scraper_metrics::register_metrics;

pub mod cache_updater;
pub use cache_updater::{CacheUpdater, CycleState, RefreshReport};

pub mod query_plan;
pub use query_plan::{plan_queries, BatchQuery, QueryLimits, QueryPlan, ResourceQuery};

pub mod scraper;
pub use scraper::{MetricPoint, MetricsScraper, ScrapeReport};
