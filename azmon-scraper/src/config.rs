use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::query_plan::QueryLimits;

/// Upper bound of metric names the batch API accepts in one request.
pub const MAX_METRICS_PER_CALL: usize = 20;
/// Upper bound of resource IDs the batch API accepts in one request.
pub const MAX_RESOURCES_PER_CALL: usize = 50;

const DEFAULT_CACHE_RESOURCES_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

/// configuration settings as found in the config file
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoadConfiguration {
    /// Subscription whose resources are scraped
    #[serde(default)]
    pub subscription_id: String,
    /// Interval between two resource cache refreshes (defaults to one day)
    pub cache_resources_seconds: Option<u64>,
    /// Cap on in-flight definition fetches and metric queries
    pub max_concurrent_requests: Option<usize>,
    /// Metric names per batch request, 1..=20
    pub maximum_number_of_metrics_in_a_call: Option<usize>,
    /// Resource IDs per batch request, 1..=50
    pub maximum_number_of_resources_in_a_call: Option<usize>,
    /// ISO 8601 aggregation interval of the queried metrics
    pub time_grain: Option<String>,
    /// Attach resource tags to every emitted point (if None, defaults to true)
    pub append_tags_as_attributes: Option<bool>,
}

/// validated scraper settings
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperConfig {
    pub subscription_id: String,
    pub cache_resources: Duration,
    pub max_concurrent_requests: usize,
    pub limits: QueryLimits,
    pub time_grain: TimeGrain,
    pub append_tags_as_attributes: bool,
}

impl ScraperConfig {
    /// Settings with every default applied.
    pub fn new(subscription_id: impl Into<String>) -> Self {
        ScraperConfig {
            subscription_id: subscription_id.into(),
            cache_resources: Duration::from_secs(DEFAULT_CACHE_RESOURCES_SECONDS),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            limits: QueryLimits::default(),
            time_grain: TimeGrain::default(),
            append_tags_as_attributes: true,
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let load: LoadConfiguration =
            serde_yaml::from_str(content).context("Failed to parse scraper configuration")?;
        ScraperConfig::try_from(load)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        ScraperConfig::from_yaml(&content)
    }
}

/// Implementing the TryFrom trait to validate LoadConfiguration into ScraperConfig
impl TryFrom<LoadConfiguration> for ScraperConfig {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        if config.subscription_id.trim().is_empty() {
            bail!("subscription_id must be set");
        }

        let cache_seconds = config
            .cache_resources_seconds
            .unwrap_or(DEFAULT_CACHE_RESOURCES_SECONDS);
        if cache_seconds == 0 {
            bail!("cache_resources_seconds must be greater than 0");
        }

        let max_concurrent_requests = config
            .max_concurrent_requests
            .unwrap_or(DEFAULT_MAX_CONCURRENT_REQUESTS);
        if max_concurrent_requests == 0 {
            bail!("max_concurrent_requests must be greater than 0");
        }

        let max_metrics = config
            .maximum_number_of_metrics_in_a_call
            .unwrap_or(MAX_METRICS_PER_CALL);
        if !(1..=MAX_METRICS_PER_CALL).contains(&max_metrics) {
            bail!(
                "maximum_number_of_metrics_in_a_call must be between 1 and {}, got {}",
                MAX_METRICS_PER_CALL,
                max_metrics
            );
        }

        let max_resources = config
            .maximum_number_of_resources_in_a_call
            .unwrap_or(MAX_RESOURCES_PER_CALL);
        if !(1..=MAX_RESOURCES_PER_CALL).contains(&max_resources) {
            bail!(
                "maximum_number_of_resources_in_a_call must be between 1 and {}, got {}",
                MAX_RESOURCES_PER_CALL,
                max_resources
            );
        }

        let time_grain = match config.time_grain.as_deref() {
            Some(grain) => TimeGrain::parse(grain)
                .ok_or_else(|| anyhow!("unsupported time_grain '{}'", grain))?,
            None => TimeGrain::default(),
        };

        Ok(ScraperConfig {
            subscription_id: config.subscription_id,
            cache_resources: Duration::from_secs(cache_seconds),
            max_concurrent_requests,
            limits: QueryLimits {
                max_metrics_per_call: max_metrics,
                max_resources_per_call: max_resources,
            },
            time_grain,
            append_tags_as_attributes: config.append_tags_as_attributes.unwrap_or(true),
        })
    }
}

/// Aggregation interval accepted by the metrics API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimeGrain {
    #[default]
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    SixHours,
    TwelveHours,
    OneDay,
}

impl TimeGrain {
    const ALL: [TimeGrain; 8] = [
        TimeGrain::OneMinute,
        TimeGrain::FiveMinutes,
        TimeGrain::FifteenMinutes,
        TimeGrain::ThirtyMinutes,
        TimeGrain::OneHour,
        TimeGrain::SixHours,
        TimeGrain::TwelveHours,
        TimeGrain::OneDay,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|grain| grain.as_iso8601().eq_ignore_ascii_case(value))
    }

    pub fn as_iso8601(&self) -> &'static str {
        match self {
            TimeGrain::OneMinute => "PT1M",
            TimeGrain::FiveMinutes => "PT5M",
            TimeGrain::FifteenMinutes => "PT15M",
            TimeGrain::ThirtyMinutes => "PT30M",
            TimeGrain::OneHour => "PT1H",
            TimeGrain::SixHours => "PT6H",
            TimeGrain::TwelveHours => "PT12H",
            TimeGrain::OneDay => "P1D",
        }
    }

    pub fn duration(&self) -> Duration {
        let minutes = match self {
            TimeGrain::OneMinute => 1,
            TimeGrain::FiveMinutes => 5,
            TimeGrain::FifteenMinutes => 15,
            TimeGrain::ThirtyMinutes => 30,
            TimeGrain::OneHour => 60,
            TimeGrain::SixHours => 6 * 60,
            TimeGrain::TwelveHours => 12 * 60,
            TimeGrain::OneDay => 24 * 60,
        };
        Duration::from_secs(minutes * 60)
    }
}

impl fmt::Display for TimeGrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_iso8601())
    }
}
