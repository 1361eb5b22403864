//! Error types for Canvass
//!
//! Every fallible operation in the workspace returns [`Result`]. The variants
//! follow the failure classes of the data-access layer:
//!
//! | Variant | Meaning | Caller action | HTTP |
//! |---------|---------|---------------|------|
//! | `Unavailable` | store not ready or connection lost | retry later | 503 |
//! | `Timeout` | call exceeded its deadline, outcome unknown | retry later | 503 |
//! | `ConnectFailed` | startup connect exhausted its retries | fatal | 503 |
//! | `NotFound` | target required to exist is absent | none | 404 |
//! | `Corruption` | stored value failed to decode | repair data | 500 |
//! | `WrongType` | key holds a different structure | fix key usage | 500 |
//! | `InvalidInput` / `Config` | rejected argument or configuration | fix input | 400 |
//!
//! Plain absence (a missing document, an empty queue) is not an error: it is
//! reported as `Ok(None)`.

use thiserror::Error;

/// Result type alias for Canvass operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the data-access layer
#[derive(Debug, Error)]
pub enum Error {
    /// The store is not ready, or the connection was lost during the call
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A call ran past its per-call deadline
    #[error("Operation '{op}' timed out after {elapsed_ms}ms")]
    Timeout {
        /// Operation name
        op: String,
        /// Time spent before the deadline tripped
        elapsed_ms: u64,
    },

    /// Connecting failed after every retry attempt was used
    #[error("Failed to connect to store after {attempts} attempts")]
    ConnectFailed {
        /// Number of attempts made
        attempts: usize,
    },

    /// A document that must exist does not
    #[error("Not found: {collection}/{id}")]
    NotFound {
        /// Collection name
        collection: String,
        /// Document id
        id: String,
    },

    /// A stored value could not be decoded
    #[error("Data corruption at {key}: {reason}")]
    Corruption {
        /// Location of the corrupt value
        key: String,
        /// Decoder message
        reason: String,
    },

    /// The key exists but holds a different structure
    #[error("Wrong type for key '{key}': expected {expected}")]
    WrongType {
        /// Offending key
        key: String,
        /// Structure the operation needed
        expected: &'static str,
    },

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Build an `Unavailable` error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Error::Unavailable(reason.into())
    }

    /// Build a `NotFound` error
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Build a `Corruption` error
    pub fn corruption(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Corruption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Build an `InvalidInput` error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_) | Error::Timeout { .. })
    }

    /// Whether this is a data-shape failure (fatal to the call, not the process)
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption { .. })
    }

    /// Status code an HTTP boundary should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Unavailable(_) | Error::Timeout { .. } | Error::ConnectFailed { .. } => 503,
            Error::NotFound { .. } => 404,
            Error::InvalidInput(_) | Error::Config(_) => 400,
            Error::Corruption { .. } | Error::WrongType { .. } | Error::Backend(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unavailable() {
        let err = Error::unavailable("store is reconnecting");
        let msg = err.to_string();
        assert!(msg.contains("Store unavailable"));
        assert!(msg.contains("reconnecting"));
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout {
            op: "hget".to_string(),
            elapsed_ms: 2500,
        };
        let msg = err.to_string();
        assert!(msg.contains("hget"));
        assert!(msg.contains("2500"));
    }

    #[test]
    fn test_error_display_corruption() {
        let err = Error::corruption("users/u1", "expected value at line 1 column 1");
        let msg = err.to_string();
        assert!(msg.contains("Data corruption"));
        assert!(msg.contains("users/u1"));
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::not_found("volunteers", "v1");
        assert_eq!(err.to_string(), "Not found: volunteers/v1");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::unavailable("down").is_retryable());
        assert!(Error::Timeout {
            op: "get".into(),
            elapsed_ms: 1
        }
        .is_retryable());
        assert!(!Error::corruption("k", "bad").is_retryable());
        assert!(!Error::not_found("c", "i").is_retryable());
        assert!(!Error::ConnectFailed { attempts: 10 }.is_retryable());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::unavailable("down").http_status(), 503);
        assert_eq!(Error::ConnectFailed { attempts: 3 }.http_status(), 503);
        assert_eq!(Error::not_found("c", "i").http_status(), 404);
        assert_eq!(Error::corruption("k", "bad").http_status(), 500);
        assert_eq!(Error::invalid_input("bad").http_status(), 400);
    }

    #[test]
    fn test_corruption_is_distinct_from_not_found() {
        let err = Error::corruption("events/e1", "trailing characters");
        assert!(err.is_corruption());
        assert!(!matches!(err, Error::NotFound { .. }));
    }
}
