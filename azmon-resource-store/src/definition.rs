use serde::{Deserialize, Serialize};

use crate::errors::{Result, StoreError};
use crate::resource_id::ResourceType;

/// Metadata of one queryable metric, as returned by the definitions listing.
///
/// Every field is optional because that is how the listing API delivers them;
/// the store validates what it needs at insertion time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    pub id: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub resource_id: Option<String>,
    pub unit: Option<String>,
    pub primary_aggregation_type: Option<String>,
    #[serde(default)]
    pub supported_aggregation_types: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
}

impl MetricDefinition {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        MetricDefinition {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            resource_id: Some(resource_id.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_aggregations<I, S>(mut self, aggregations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_aggregation_types = aggregations.into_iter().map(Into::into).collect();
        self
    }

    /// Best available label for log lines and error messages.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unnamed>")
    }

    /// The `(namespace, name)` pair the definition is keyed by.
    pub fn namespaced_key(&self) -> Result<(&str, &str)> {
        let namespace = self
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| StoreError::MissingNamespace(self.label().to_string()))?;
        let name = self
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                StoreError::MissingMetricName(self.id.clone().unwrap_or_default())
            })?;
        Ok((namespace, name))
    }

    /// Type of the resource the definition was fetched for.
    pub fn resource_type(&self) -> Result<ResourceType> {
        let resource_id = self
            .resource_id
            .as_deref()
            .ok_or(StoreError::MissingResourceId)?;
        ResourceType::parse(resource_id)
    }

    /// Platform metrics live in a namespace named after the resource type;
    /// anything else is a custom namespace the batch API cannot serve.
    pub fn is_platform_metric(&self) -> bool {
        match (self.namespace.as_deref(), self.resource_type()) {
            (Some(ns), Ok(resource_type)) => resource_type.matches(ns),
            _ => false,
        }
    }
}
