//! # cipherlog Server
//!
//! HTTP API server for cipherlog.
//!
//! This crate provides:
//! - The request router: verb dispatch over a single resource path
//!   (PUT ingests, GET enumerates, POST/DELETE are reserved, everything
//!   else is a bad request)
//! - The service lifecycle: listener ownership, coordinated shutdown on
//!   signal or [`ShutdownHandle`], store close, and a single terminal
//!   outcome
//! - Server configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use cipherlog_server::{Server, ServerConfig};
//!
//! # async fn run() -> Result<(), cipherlog_server::ServerError> {
//! let config = ServerConfig::new("cipherlog.db", "passphrase");
//! let server = Server::bind(config).await?;
//! let handle = server.shutdown_handle();
//!
//! // handle.shutdown() from anywhere stops the listener gracefully.
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod lifecycle;
mod router;

pub use config::{resolve_bind_addr, IpFamily, ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use lifecycle::{Server, ShutdownHandle, StopReason};
pub use router::{router, AppState};
