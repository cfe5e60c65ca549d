//! Type-partitioned cache of cloud resources and their metric definitions.
//!
//! Resources are grouped into one [`ResourceBatch`] per resource type inside a
//! concurrent [`ResourceStore`]. Listing sweeps reconcile a batch against the
//! fresh listing and hand back the IDs that disappeared; definition fetches
//! feed the namespace-partitioned definitions the batch query planner reads.

mod errors;
pub use errors::{BatchOutcome, ItemErrors, Result, StoreError};

mod set;
pub use set::Set;

pub mod resource_id;
pub use resource_id::{ResourceId, ResourceType, BUILTIN_NAMESPACE};

mod definition;
pub use definition::MetricDefinition;

mod resource;
pub use resource::Resource;

mod resource_batch;
pub use resource_batch::{NamespacedDefinitions, Reconciliation, ResourceBatch};

mod resource_store;
pub use resource_store::ResourceStore;

// Unit tests
#[cfg(test)]
mod resource_batch_test;
