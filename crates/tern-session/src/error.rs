//! Error types for tern-session

use thiserror::Error;

/// Result type alias using tern-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the backend layer
    #[error(transparent)]
    Backend(#[from] tern_ai::Error),

    /// Usage persistence failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No resource is available to serve a request
    #[error("No resource available for provider {0}")]
    NoResource(String),
}
