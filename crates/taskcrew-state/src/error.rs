//! Error types for taskcrew-state

use thiserror::Error;

/// Errors that can occur while writing to or reading from a metrics sink.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error
    #[error("metrics store connection failed: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("metrics schema setup failed: {0}")]
    SchemaSetup(String),

    /// Query or write rejected by the backend
    #[error("metrics backend error: {0}")]
    Backend(String),

    /// A value could not be converted to or from its stored form
    #[error("metrics serialization failed: {0}")]
    Serialization(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
