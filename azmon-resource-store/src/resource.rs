use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::definition::MetricDefinition;
use crate::errors::{BatchOutcome, Result, StoreError};

/// One cloud resource as delivered by the resource listing, plus the metric
/// definitions fetched for it individually.
///
/// The per-resource definitions serve custom metrics, which the batch metrics
/// API cannot query. They stay `None` until the first definitions fetch for
/// this resource completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub location: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(skip)]
    definitions: Option<BTreeMap<String, MetricDefinition>>,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Resource {
            id: Some(id.into()),
            resource_type: Some(resource_type.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Stores definitions keyed by metric name, falling back to the
    /// definition ID when the name is missing. Definitions with neither are
    /// reported and skipped, the others are still stored.
    pub fn store_definitions(&mut self, definitions: &[MetricDefinition]) -> Result<BatchOutcome> {
        if self.id.is_none() {
            return Err(StoreError::MissingResourceId);
        }

        let stored = self.definitions.get_or_insert_with(BTreeMap::new);
        Ok(insert_keyed(stored, definitions))
    }

    /// Like [`Self::store_definitions`], but the result becomes the whole
    /// definition set of the resource: anything not in `definitions` is
    /// dropped. An empty slice leaves the resource without definitions.
    pub fn replace_definitions(&mut self, definitions: &[MetricDefinition]) -> Result<BatchOutcome> {
        if self.id.is_none() {
            return Err(StoreError::MissingResourceId);
        }

        let mut fresh = BTreeMap::new();
        let outcome = insert_keyed(&mut fresh, definitions);
        self.definitions = Some(fresh);
        Ok(outcome)
    }

    pub fn get_definition(&self, name: &str) -> Option<&MetricDefinition> {
        self.definitions.as_ref()?.get(name)
    }

    pub fn definitions(&self) -> Option<&BTreeMap<String, MetricDefinition>> {
        self.definitions.as_ref()
    }

    pub fn has_definitions(&self) -> bool {
        self.definitions.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// Namespaces of the per-resource definitions, sorted and deduplicated.
    pub fn definition_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self
            .definitions
            .iter()
            .flat_map(|defs| defs.values())
            .filter_map(|d| d.namespace.clone())
            .collect();
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    /// Replaces the listing attributes with a fresher copy while keeping the
    /// definitions already fetched, unless the fresh copy carries its own.
    pub(crate) fn refresh_from(&mut self, fresh: Resource) {
        let definitions = fresh.definitions.or_else(|| self.definitions.take());
        *self = Resource {
            definitions,
            ..fresh
        };
    }
}

fn insert_keyed(
    stored: &mut BTreeMap<String, MetricDefinition>,
    definitions: &[MetricDefinition],
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for definition in definitions {
        let key = definition
            .name
            .as_deref()
            .or(definition.id.as_deref())
            .filter(|k| !k.is_empty());
        match key {
            Some(key) => {
                stored.insert(key.to_string(), definition.clone());
                outcome.stored += 1;
            }
            None => outcome.reject(StoreError::MissingMetricName(
                definition.id.clone().unwrap_or_default(),
            )),
        }
    }
    outcome
}
