//! Error types for tern-ai

use thiserror::Error;

/// Result type alias using tern-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to an agent backend
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure on the backend channel
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend rejected a command or reported a failure
    #[error("Backend error: {message} (type: {error_type})")]
    Backend { error_type: String, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Provider not supported
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),
}

impl Error {
    /// Create a backend error from type and message
    pub fn backend(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Check if this error reports an authentication problem
    pub fn is_auth(&self) -> bool {
        match self {
            Error::Auth(_) => true,
            Error::Backend {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("auth")
                    || msg.contains("unauthorized")
                    || msg.contains("invalid api key")
                    || msg.contains("401")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_typed_variant() {
        assert!(Error::Auth("token expired".into()).is_auth());
    }

    #[test]
    fn test_auth_backend_error_type() {
        let e = Error::backend("authentication_error", "Please log in again");
        assert!(e.is_auth());
    }

    #[test]
    fn test_auth_backend_unauthorized_message() {
        let e = Error::backend("error", "401 Unauthorized");
        assert!(e.is_auth());
    }

    #[test]
    fn test_not_auth_quota() {
        let e = Error::backend("error", "quota exceeded");
        assert!(!e.is_auth());
    }
}
