//! Error types for store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the persistence file lock.
    #[error("persistence file locked: {path} is in use by another process")]
    Locked {
        /// Path to the locked persistence file.
        path: PathBuf,
    },

    /// The persistence file has an unrecognized or corrupt layout.
    #[error("invalid persistence file format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed (wrong key or tampered data).
    #[error("decryption failed: {message}")]
    Decryption {
        /// Description of the failure.
        message: String,
    },

    /// Snapshot encoding or decoding failed.
    #[error("snapshot codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// A write would exceed the configured entry cap.
    #[error("store capacity exceeded: limit is {limit} entries")]
    CapacityExceeded {
        /// The configured maximum number of entries.
        limit: usize,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a decryption error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Creates a snapshot codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec {
            message: message.to_string(),
        }
    }
}
