use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid resource type or ID '{input}': {reason}")]
    InvalidResourceType { input: String, reason: String },

    #[error("Resource type mismatch: {expected} != {actual}")]
    ResourceTypeMismatch { expected: String, actual: String },

    #[error("Resource already exists: {0}")]
    DuplicateResource(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource ID missing")]
    MissingResourceId,

    #[error("Resource type missing for resource: {0}")]
    MissingResourceType(String),

    #[error("Metric definition namespace missing: {0}")]
    MissingNamespace(String),

    #[error("Metric definition name missing (definition ID: {0})")]
    MissingMetricName(String),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("No items to store")]
    EmptyInput,
}

impl StoreError {
    pub(crate) fn invalid_type(input: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidResourceType {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// The per-item failures of a bulk call, rendered one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemErrors(pub Vec<StoreError>);

impl ItemErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreError> {
        self.0.iter()
    }
}

impl fmt::Display for ItemErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ItemErrors {}

/// Result of a best-effort bulk operation: how many items were applied and
/// which ones were rejected. A rejected item never stops the rest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub stored: usize,
    pub errors: Vec<StoreError>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn reject(&mut self, err: StoreError) {
        self.errors.push(err);
    }

    pub(crate) fn merge(&mut self, other: BatchOutcome) {
        self.stored += other.stored;
        self.errors.extend(other.errors);
    }

    /// Collapses the outcome into a plain `Result`, dropping the success count
    /// when any item failed.
    pub fn into_result(self) -> std::result::Result<usize, ItemErrors> {
        if self.errors.is_empty() {
            Ok(self.stored)
        } else {
            Err(ItemErrors(self.errors))
        }
    }
}
