//! Error types for the API server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while running the API server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Store error (open, close, or transaction failure).
    #[error("store error: {0}")]
    Store(#[from] cipherlog_store::StoreError),

    /// Listener or connection I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bind address could not be parsed.
    #[error("invalid bind address: {addr}")]
    InvalidAddress {
        /// The rejected address string.
        addr: String,
    },

    /// The protocol family flag was not recognized.
    #[error("invalid protocol {value:?}: expected tcp, tcp4 or tcp6")]
    InvalidProtocol {
        /// The rejected value.
        value: String,
    },
}

impl ServerError {
    /// Creates an invalid address error.
    pub fn invalid_address(addr: impl Into<String>) -> Self {
        Self::InvalidAddress { addr: addr.into() }
    }
}
