//! Error types for ratewatchd

use std::path::PathBuf;
use thiserror::Error;

/// Rate watch daemon errors
#[derive(Error, Debug)]
pub enum RatewatchError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Handler could not be started
    #[error("Failed to spawn handler '{}': {source}", path.display())]
    Handler {
        /// Handler executable path
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RatewatchError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true when the handler executable does not exist.
    pub fn is_handler_not_found(&self) -> bool {
        matches!(
            self,
            RatewatchError::Handler { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Result type for ratewatchd operations
pub type Result<T> = std::result::Result<T, RatewatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RatewatchError::config("window must be > 0");
        assert_eq!(err.to_string(), "Configuration error: window must be > 0");
    }

    #[test]
    fn test_handler_error_display() {
        let err = RatewatchError::Handler {
            path: PathBuf::from("/opt/alert.sh"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().contains("/opt/alert.sh"));
        assert!(err.is_handler_not_found());
    }

    #[test]
    fn test_handler_permission_is_not_not_found() {
        let err = RatewatchError::Handler {
            path: PathBuf::from("/opt/alert.sh"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_handler_not_found());
    }

    #[test]
    fn test_io_from() {
        let err: RatewatchError = std::io::Error::other("disk full").into();
        assert_eq!(err.to_string(), "IO error: disk full");
    }
}
