use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::{mapref::one::RefMut, DashMap};
use tracing::{debug, warn};

use crate::definition::MetricDefinition;
use crate::errors::{BatchOutcome, Result, StoreError};
use crate::resource::Resource;
use crate::resource_batch::{Reconciliation, ResourceBatch};
use crate::resource_id::ResourceType;

/// Concurrent index of [`ResourceBatch`]es keyed by resource type.
///
/// Load-or-create of a batch is atomic per type and every batch mutation runs
/// under the shard lock of its type, so discovery and definition fetches may
/// hit the same type from several tasks. Batches are never removed; a type
/// without live resources keeps an empty batch until a later sweep refills it.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    batches: Arc<DashMap<String, ResourceBatch>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        ResourceStore {
            batches: Arc::new(DashMap::new()),
        }
    }

    fn batch_mut(&self, resource_type: &ResourceType) -> RefMut<'_, String, ResourceBatch> {
        self.batches
            .entry(resource_type.key().to_string())
            .or_insert_with(|| ResourceBatch::with_type(resource_type.clone()))
    }

    /// Stores shared definitions of a single resource type.
    ///
    /// The type is taken from the first definition's resource ID; later
    /// definitions of another type are rejected item by item. Fails without
    /// touching the store on empty input or when the first definition has no
    /// usable resource ID.
    pub fn store_definitions(&self, definitions: &[MetricDefinition]) -> Result<BatchOutcome> {
        let first = definitions.first().ok_or(StoreError::EmptyInput)?;
        let resource_type = first.resource_type()?;

        let outcome = self.batch_mut(&resource_type).store_definitions(definitions);
        if !outcome.is_clean() {
            warn!(
                resource_type = %resource_type,
                rejected = outcome.errors.len(),
                stored = outcome.stored,
                "some metric definitions were rejected"
            );
        }
        Ok(outcome)
    }

    /// Partitions `resources` by the type parsed from their IDs and reconciles
    /// every batch against its partition.
    ///
    /// Known types that do not appear in `resources` are reconciled against an
    /// empty listing, so the returned stale set covers everything the listing
    /// no longer mentions. An empty input is a valid listing of nothing.
    ///
    /// A resource without an ID or with an unparsable ID fails the whole call
    /// before any batch is touched.
    pub fn store_resources(&self, resources: Vec<Resource>) -> Result<Reconciliation> {
        let mut partitions: HashMap<String, (ResourceType, Vec<Resource>)> = HashMap::new();
        for resource in resources {
            let id = resource.id().ok_or(StoreError::MissingResourceId)?;
            let resource_type = ResourceType::parse(id)?;
            partitions
                .entry(resource_type.key().to_string())
                .or_insert_with(|| (resource_type, Vec::new()))
                .1
                .push(resource);
        }

        // collected up front: no shard guard may be held while writing below
        let vanished: Vec<String> = self
            .batches
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| !partitions.contains_key(key))
            .collect();

        let mut result = Reconciliation::default();
        for (_, (resource_type, items)) in partitions {
            let reconciliation = self.batch_mut(&resource_type).store_resources(items);
            debug!(
                resource_type = %resource_type,
                stored = reconciliation.stored,
                stale = reconciliation.stale.len(),
                "reconciled resource batch"
            );
            result.merge(reconciliation);
        }
        for key in vanished {
            if let Some(mut batch) = self.batches.get_mut(&key) {
                result.merge(batch.store_resources(Vec::new()));
            }
        }

        if !result.is_clean() {
            warn!(
                rejected = result.errors.len(),
                "some resources were rejected during reconciliation"
            );
        }
        Ok(result)
    }

    /// Stores per-resource (custom) definitions on an already known resource.
    pub fn store_resource_definitions(
        &self,
        resource_id: &str,
        definitions: &[MetricDefinition],
    ) -> Result<BatchOutcome> {
        let resource_type = ResourceType::parse(resource_id)?;
        let mut batch = self
            .batches
            .get_mut(resource_type.key())
            .ok_or_else(|| StoreError::ResourceNotFound(resource_id.to_string()))?;
        batch.store_resource_definitions(resource_id, definitions)
    }

    /// Replaces the custom definitions of one resource with `definitions`.
    pub fn replace_resource_definitions(
        &self,
        resource_id: &str,
        definitions: &[MetricDefinition],
    ) -> Result<BatchOutcome> {
        let resource_type = ResourceType::parse(resource_id)?;
        let mut batch = self
            .batches
            .get_mut(resource_type.key())
            .ok_or_else(|| StoreError::ResourceNotFound(resource_id.to_string()))?;
        batch.replace_resource_definitions(resource_id, definitions)
    }

    /// Deletes resources of any type. Unknown IDs and unparsable IDs are
    /// reported per item; everything else is removed.
    pub fn delete_resources<I, S>(&self, resource_ids: I) -> BatchOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = BatchOutcome::default();
        let mut by_type: HashMap<String, Vec<String>> = HashMap::new();
        for id in resource_ids {
            let id = id.as_ref();
            match ResourceType::parse(id) {
                Ok(resource_type) => by_type
                    .entry(resource_type.key().to_string())
                    .or_default()
                    .push(id.to_string()),
                Err(err) => outcome.reject(err),
            }
        }

        for (key, ids) in by_type {
            match self.batches.get_mut(&key) {
                Some(mut batch) => outcome.merge(batch.delete_resources(&ids)),
                None => ids
                    .into_iter()
                    .for_each(|id| outcome.reject(StoreError::ResourceNotFound(id))),
            }
        }
        outcome
    }

    /// All shared definitions of a type flattened into one name-keyed map.
    /// `None` when the type is unknown.
    pub fn get_definitions(&self, resource_type: &str) -> Option<BTreeMap<String, MetricDefinition>> {
        let resource_type = ResourceType::parse(resource_type).ok()?;
        let batch = self.batches.get(resource_type.key())?;
        Some(
            batch
                .definitions()
                .values()
                .flat_map(|metrics| metrics.iter())
                .map(|(name, def)| (name.clone(), def.clone()))
                .collect(),
        )
    }

    pub fn get_definition(
        &self,
        resource_type: &str,
        namespace: &str,
        name: &str,
    ) -> Option<MetricDefinition> {
        let resource_type = ResourceType::parse(resource_type).ok()?;
        let batch = self.batches.get(resource_type.key())?;
        batch.get_definition(namespace, name).cloned()
    }

    /// Runs `f` against the batch of one type while holding its read guard.
    pub fn with_batch<F, R>(&self, resource_type: &str, f: F) -> Option<R>
    where
        F: FnOnce(&ResourceBatch) -> R,
    {
        let resource_type = ResourceType::parse(resource_type).ok()?;
        let batch = self.batches.get(resource_type.key())?;
        Some(f(&batch))
    }

    /// Visits every batch until `f` returns `false`.
    ///
    /// Iteration is weakly consistent: batches created while it runs may or
    /// may not be visited. `f` must not write to this store, since the shard
    /// being read is locked for the duration of the call.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&ResourceType, &ResourceBatch) -> bool,
    {
        for entry in self.batches.iter() {
            let batch = entry.value();
            if !f(batch.resource_type(), batch) {
                break;
            }
        }
    }

    pub fn contains_resource(&self, resource_id: &str) -> bool {
        ResourceType::parse(resource_id)
            .ok()
            .and_then(|t| self.batches.get(t.key()))
            .is_some_and(|batch| batch.resource(resource_id).is_some())
    }

    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.batches
            .iter()
            .map(|entry| entry.value().resource_type().clone())
            .collect()
    }

    /// Number of batches, empty ones included.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Number of resources across all batches.
    pub fn resource_count(&self) -> usize {
        self.batches.iter().map(|entry| entry.value().len()).sum()
    }
}
