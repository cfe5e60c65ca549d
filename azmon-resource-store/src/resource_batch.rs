use std::collections::{BTreeMap, BTreeSet};

use crate::definition::MetricDefinition;
use crate::errors::{BatchOutcome, Result, StoreError};
use crate::resource::Resource;
use crate::resource_id::ResourceType;
use crate::set::Set;

/// Definitions keyed by namespace, then by metric name.
pub type NamespacedDefinitions = BTreeMap<String, BTreeMap<String, MetricDefinition>>;

/// Outcome of a reconciling [`ResourceBatch::store_resources`] call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reconciliation {
    /// IDs known before the sweep that the sweep did not mention.
    pub stale: Set,
    pub stored: usize,
    pub errors: Vec<StoreError>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn merge(&mut self, other: Reconciliation) {
        self.stale = self.stale.union(&other.stale);
        self.stored += other.stored;
        self.errors.extend(other.errors);
    }
}

/// All resources of a single resource type together with the metric
/// definitions shared by them.
///
/// The batch metrics API only accepts resources of one type per request and
/// does not serve per-resource custom metrics, so one set of definitions per
/// (type, namespace) is enough for every resource of the type. Custom
/// metrics stay on the individual [`Resource`].
///
/// Every resource and definition accepted here has the batch's type;
/// mismatches are rejected, never coerced. Resource IDs match ignoring ASCII
/// case, as they do upstream; the stored resource keeps its own spelling.
#[derive(Debug, Clone)]
pub struct ResourceBatch {
    resource_type: ResourceType,
    /// Keyed by [`resource_key`].
    resources: BTreeMap<String, Resource>,
    definitions: NamespacedDefinitions,
}

impl ResourceBatch {
    /// Creates an empty batch for the type named by `resource_type_or_id`,
    /// which may be a literal resource type or any resource ID of that type.
    pub fn new(resource_type_or_id: &str) -> Result<Self> {
        Ok(Self::with_type(ResourceType::parse(resource_type_or_id)?))
    }

    pub fn with_type(resource_type: ResourceType) -> Self {
        ResourceBatch {
            resource_type,
            resources: BTreeMap::new(),
            definitions: BTreeMap::new(),
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Strict single insert: the resource must be of this type and unknown.
    pub fn add_resource(&mut self, resource: Resource) -> Result<()> {
        let id = self.check_resource(&resource)?;
        let key = resource_key(id);
        if self.resources.contains_key(&key) {
            return Err(StoreError::DuplicateResource(id.to_string()));
        }
        self.resources.insert(key, resource);
        Ok(())
    }

    /// Inserts or overwrites one definition. Unlike [`Self::store_definitions`]
    /// the owning resource must already be part of the batch.
    pub fn add_definition(&mut self, definition: MetricDefinition) -> Result<()> {
        self.check_definition(&definition)?;
        let resource_id = definition
            .resource_id
            .as_deref()
            .ok_or(StoreError::MissingResourceId)?;
        if !self.resources.contains_key(&resource_key(resource_id)) {
            return Err(StoreError::ResourceNotFound(resource_id.to_string()));
        }
        self.upsert_definition(definition);
        Ok(())
    }

    /// Best-effort bulk upsert of shared definitions. Items of another type or
    /// missing their namespace/name are reported; the rest are stored.
    pub fn store_definitions(&mut self, definitions: &[MetricDefinition]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for definition in definitions {
            match self.check_definition(definition) {
                Ok(()) => {
                    self.upsert_definition(definition.clone());
                    outcome.stored += 1;
                }
                Err(err) => outcome.reject(err),
            }
        }
        outcome
    }

    /// Reconciles the batch against a fresh listing of this type.
    ///
    /// Known resources present in `resources` are refreshed in place, new ones
    /// inserted. The returned stale set holds the IDs known before the call
    /// that `resources` did not mention; evicting them is left to the caller.
    /// Items that fail validation are reported, not stored, and do not count
    /// as seen.
    pub fn store_resources(&mut self, resources: Vec<Resource>) -> Reconciliation {
        let mut unseen: BTreeSet<String> = self.resources.keys().cloned().collect();
        let mut stored = 0;
        let mut errors = Vec::new();

        for resource in resources {
            let key = match self.check_resource(&resource) {
                Ok(id) => resource_key(id),
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            unseen.remove(&key);
            match self.resources.get_mut(&key) {
                Some(known) => known.refresh_from(resource),
                None => {
                    self.resources.insert(key, resource);
                }
            }
            stored += 1;
        }

        // unseen resources were not touched, so they still carry their IDs
        let stale: Set = unseen
            .iter()
            .filter_map(|key| self.resources.get(key).and_then(Resource::id))
            .collect();

        Reconciliation {
            stale,
            stored,
            errors,
        }
    }

    /// Stores definitions on one resource of the batch (the custom metrics path).
    pub fn store_resource_definitions(
        &mut self,
        resource_id: &str,
        definitions: &[MetricDefinition],
    ) -> Result<BatchOutcome> {
        self.resource_mut(resource_id)?.store_definitions(definitions)
    }

    /// Sets the full custom definition set of one resource, dropping any
    /// definition the latest fetch no longer returned.
    pub fn replace_resource_definitions(
        &mut self,
        resource_id: &str,
        definitions: &[MetricDefinition],
    ) -> Result<BatchOutcome> {
        self.resource_mut(resource_id)?.replace_definitions(definitions)
    }

    /// Deletes the given resources together with their own definitions.
    /// IDs that are not in the batch are reported as `ResourceNotFound`.
    ///
    /// Once the last resource is gone the shared definitions are dropped as
    /// well, so no later query is planned for a type without members.
    pub fn delete_resources<I, S>(&mut self, resource_ids: I) -> BatchOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = BatchOutcome::default();
        for id in resource_ids {
            let id = id.as_ref();
            if self.resources.remove(&resource_key(id)).is_some() {
                outcome.stored += 1;
            } else {
                outcome.reject(StoreError::ResourceNotFound(id.to_string()));
            }
        }
        if outcome.stored > 0 && self.resources.is_empty() {
            self.definitions.clear();
        }
        outcome
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    pub fn namespace_metric_names(&self, namespace: &str) -> Result<Vec<String>> {
        self.definitions
            .get(namespace)
            .map(|metrics| metrics.keys().cloned().collect())
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))
    }

    pub fn resource_ids(&self) -> Vec<String> {
        self.resources
            .values()
            .filter_map(|r| r.id().map(str::to_string))
            .collect()
    }

    pub fn definitions(&self) -> &NamespacedDefinitions {
        &self.definitions
    }

    pub fn get_definition(&self, namespace: &str, name: &str) -> Option<&MetricDefinition> {
        self.definitions.get(namespace)?.get(name)
    }

    /// Looks a metric up by name across all namespaces.
    pub fn find_definition(&self, name: &str) -> Option<&MetricDefinition> {
        self.definitions.values().find_map(|metrics| metrics.get(name))
    }

    pub fn resource(&self, resource_id: &str) -> Option<&Resource> {
        self.resources.get(&resource_key(resource_id))
    }

    fn resource_mut(&mut self, resource_id: &str) -> Result<&mut Resource> {
        self.resources
            .get_mut(&resource_key(resource_id))
            .ok_or_else(|| StoreError::ResourceNotFound(resource_id.to_string()))
    }

    /// Visits resources in ID order until `f` returns `false`.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Resource) -> bool,
    {
        for (key, resource) in &self.resources {
            if !f(resource.id().unwrap_or(key.as_str()), resource) {
                break;
            }
        }
    }

    // The type field is checked before it is used, then the ID.
    fn check_resource<'r>(&self, resource: &'r Resource) -> Result<&'r str> {
        let label = resource.id().unwrap_or("<unknown>");
        let declared = resource
            .resource_type
            .as_deref()
            .ok_or_else(|| StoreError::MissingResourceType(label.to_string()))?;
        let declared_type = ResourceType::parse(declared)?;
        if declared_type != self.resource_type {
            return Err(StoreError::ResourceTypeMismatch {
                expected: self.resource_type.to_string(),
                actual: declared.to_string(),
            });
        }
        resource.id().ok_or(StoreError::MissingResourceId)
    }

    fn check_definition(&self, definition: &MetricDefinition) -> Result<()> {
        definition.namespaced_key()?;
        let definition_type = definition.resource_type()?;
        if definition_type != self.resource_type {
            return Err(StoreError::ResourceTypeMismatch {
                expected: self.resource_type.to_string(),
                actual: definition_type.to_string(),
            });
        }
        Ok(())
    }

    // Callers validate first; a definition without a key is ignored here.
    fn upsert_definition(&mut self, definition: MetricDefinition) {
        let (namespace, name) = match definition.namespaced_key() {
            Ok((ns, name)) => (ns.to_string(), name.to_string()),
            Err(_) => return,
        };
        self.definitions
            .entry(namespace)
            .or_default()
            .insert(name, definition);
    }
}

fn resource_key(resource_id: &str) -> String {
    resource_id.to_ascii_lowercase()
}
