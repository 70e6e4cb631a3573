//! # cipherlog Store
//!
//! Embedded, encrypted, transactional key-value store for cipherlog.
//!
//! The store keeps its working set fully in memory as a map of string keys
//! to opaque byte values, and snapshots the whole map to a single
//! AES-256-GCM-encrypted file after every mutating transaction. Values are
//! never interpreted - callers own all value encoding.
//!
//! ## Transaction model
//!
//! All reads and writes go through [`Store::run`], which executes a closure
//! against a [`StoreTxn`] while holding the store's single mutex. This gives
//! strict single-writer mutual exclusion: no two transactions ever
//! interleave, so a check-then-write sequence inside one closure is atomic
//! with respect to every other transaction.
//!
//! Mutations apply to the live map immediately and are **not** undone when
//! the closure returns an error. Callers that need all-or-nothing semantics
//! delete their own writes before returning the error; the snapshot written
//! at the end of the transaction then reflects the rolled-back state. When
//! the closure succeeds but the snapshot cannot be persisted, the store
//! undoes the transaction's mutations itself, so a reported failure is
//! never observable as committed data.
//!
//! ## Example
//!
//! ```rust
//! use cipherlog_store::{Store, StoreError, StoreOptions};
//!
//! let store = Store::open_in_memory("passphrase", StoreOptions::default()).unwrap();
//! store
//!     .run(|txn| {
//!         txn.put("a", b"1".to_vec())?;
//!         Ok::<_, StoreError>(())
//!     })
//!     .unwrap();
//! assert_eq!(store.len().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod crypto;
mod error;
mod store;

pub use backend::{FileBackend, MemoryBackend, PersistenceBackend};
pub use crypto::{CryptoManager, EncryptionKey, KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};
pub use error::{StoreError, StoreResult};
pub use store::{Store, StoreOptions, StoreTxn};
