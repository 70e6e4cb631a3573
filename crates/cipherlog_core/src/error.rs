//! Error types for core operations.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during ingestion and enumeration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The request body stream could not be decoded.
    ///
    /// Always client-attributable; nothing is written to the store.
    #[error("malformed input: {message}")]
    MalformedInput {
        /// Description of the decode failure.
        message: String,
    },

    /// Store error.
    #[error("storage error: {0}")]
    Store(#[from] cipherlog_store::StoreError),

    /// A stored record could not be encoded or decoded.
    #[error("record codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Surrogate-id generation kept colliding past the retry cap.
    ///
    /// With an effectively unbounded id space this indicates a broken
    /// random source, not a full store.
    #[error("surrogate id space exhausted after {attempts} attempts")]
    IdSpaceExhausted {
        /// Number of generation attempts made.
        attempts: usize,
    },

    /// An I/O error occurred while writing to the output sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a malformed input error.
    pub fn malformed_input(message: impl std::fmt::Display) -> Self {
        Self::MalformedInput {
            message: message.to_string(),
        }
    }

    /// Creates a record codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec {
            message: message.to_string(),
        }
    }

    /// Returns `true` if the error is attributable to the client.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MalformedInput { .. })
    }
}
