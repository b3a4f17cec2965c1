//! Error types for the aqueduct client layer
//!
//! A single error enum covers the whole taxonomy: backend errors reported by
//! the server, transport failures that make a session unusable, and local
//! state errors that never reach the wire. We use `thiserror` for automatic
//! `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for aqueduct operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the aqueduct client layer
///
/// Three families:
/// - Backend errors (`Backend`): the server rejected a command. Inside an
///   active transaction these force the transaction into the failed state.
/// - Transport errors (`Disconnected`): the session is unusable and will be
///   discarded rather than returned to the pool.
/// - Local state errors (`TransactionRolledBack`, `InvalidState`, pool
///   errors): produced synchronously, without any session I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A query was attempted on a transaction that has failed.
    ///
    /// The message text is a fixed, testable contract: callers match on it
    /// to detect that the surrounding transaction must be rolled back.
    #[error("Transaction is rolled back")]
    TransactionRolledBack,

    /// The backend rejected a command (malformed SQL, constraint violation, ...)
    #[error("backend error {code}: {message}")]
    Backend {
        /// Backend error code (SQLSTATE-style)
        code: String,
        /// Human-readable message from the backend
        message: String,
    },

    /// The underlying transport failed; the session is unusable
    #[error("connection lost: {message}")]
    Disconnected {
        /// Description of the transport failure
        message: String,
    },

    /// An operation was attempted in a state that does not permit it
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the misuse
        message: String,
    },

    /// Waiting for a pooled session exceeded the configured acquire timeout
    #[error("timed out waiting for a pooled session")]
    AcquireTimeout,

    /// The pool has been shut down
    #[error("pool is closed")]
    PoolClosed,

    /// Creating a new physical session failed
    #[error("failed to create session: {message}")]
    SessionCreate {
        /// Description of the creation failure
        message: String,
    },
}

impl Error {
    /// Construct a backend error
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Construct a transport error
    pub fn disconnected(message: impl Into<String>) -> Self {
        Error::Disconnected {
            message: message.into(),
        }
    }

    /// Construct a local state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState {
            message: message.into(),
        }
    }

    /// True for transport failures that make the session unusable
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::Disconnected { .. })
    }

    /// True for errors reported by the backend in response to a command
    pub fn is_backend(&self) -> bool {
        matches!(self, Error::Backend { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolled_back_message_is_fixed() {
        // Exact text is part of the public contract.
        assert_eq!(
            Error::TransactionRolledBack.to_string(),
            "Transaction is rolled back"
        );
    }

    #[test]
    fn backend_error_display() {
        let err = Error::backend("23505", "duplicate key value violates unique constraint");
        let msg = err.to_string();
        assert!(msg.contains("23505"));
        assert!(msg.contains("duplicate key"));
        assert!(err.is_backend());
        assert!(!err.is_disconnect());
    }

    #[test]
    fn disconnect_classification() {
        let err = Error::disconnected("connection reset by peer");
        assert!(err.is_disconnect());
        assert!(!err.is_backend());
    }
}
