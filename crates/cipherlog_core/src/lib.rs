//! # cipherlog Core
//!
//! The append-log ingestion engine behind the cipherlog API.
//!
//! This crate turns an arbitrary-length stream of client-submitted
//! `{"logical_key":"base64_payload"}` JSON objects into uniquely-keyed,
//! durably persisted records with all-or-nothing semantics, and reads them
//! all back out as newline-delimited JSON.
//!
//! The store is append-only: submitting the same logical key twice creates
//! two independent records under two distinct surrogate ids, never an
//! overwrite. The store behaves as a log of key/value events, not a map.
//!
//! ## Components
//!
//! - [`SurrogateId`] - collision-resistant storage keys (timestamp plus
//!   random suffix); uniqueness is enforced by the ingestion engine, not
//!   by construction
//! - [`ingest`] - decodes a request body stream and commits the whole
//!   batch in one transaction, or nothing at all
//! - [`export`] - enumerates every committed record as one JSON object
//!   per line
//! - [`write_sentinel`] - the out-of-band error signal appended to an
//!   export stream after transport status has already committed to success

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod export;
mod id;
mod ingest;
mod record;

pub use error::{CoreError, CoreResult};
pub use export::{export, write_sentinel, SERVER_ERROR_KEY};
pub use id::{IdGenerator, RandomIdGenerator, SurrogateId};
pub use ingest::{ingest, ingest_with, MAX_ID_ATTEMPTS};
pub use record::{Base64Bytes, Record};
