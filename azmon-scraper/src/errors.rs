use azmon_resource_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScraperError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScraperError {
    #[error("Resource store error: {0}")]
    Store(#[from] StoreError),

    #[error("{operation} failed: {message}")]
    Client { operation: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScraperError {
    pub fn client(operation: impl Into<String>, message: impl ToString) -> Self {
        ScraperError::Client {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}
