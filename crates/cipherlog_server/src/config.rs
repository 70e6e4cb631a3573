//! Server configuration.

use crate::error::{ServerError, ServerResult};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

/// Default port the API server listens on.
pub const DEFAULT_PORT: u16 = 11185;

/// Network protocol family to listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpFamily {
    /// IPv4 (`tcp4`, also plain `tcp`).
    #[default]
    Tcp4,
    /// IPv6 (`tcp6`).
    Tcp6,
}

impl IpFamily {
    /// Returns the wildcard address for this family.
    #[must_use]
    pub fn wildcard(self) -> IpAddr {
        match self {
            Self::Tcp4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Self::Tcp6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

impl FromStr for IpFamily {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" | "tcp4" => Ok(Self::Tcp4),
            "tcp6" => Ok(Self::Tcp6),
            other => Err(ServerError::InvalidProtocol {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp4 => f.write_str("tcp4"),
            Self::Tcp6 => f.write_str("tcp6"),
        }
    }
}

/// Resolves a bind address string against a protocol family.
///
/// A bare `:port` binds the family's wildcard address (so `:11185` with
/// tcp4 becomes `0.0.0.0:11185`); anything else must be a full socket
/// address.
///
/// # Errors
///
/// Returns [`ServerError::InvalidAddress`] if the string cannot be parsed.
pub fn resolve_bind_addr(family: IpFamily, addr: &str) -> ServerResult<SocketAddr> {
    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|_| ServerError::invalid_address(addr))?;
        return Ok(SocketAddr::new(family.wildcard(), port));
    }

    addr.parse()
        .map_err(|_| ServerError::invalid_address(addr))
}

/// Configuration for the API server.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to.
    pub bind_addr: SocketAddr,
    /// Path to the persistence file.
    pub db_path: PathBuf,
    /// Opaque encryption key, forwarded to the store untouched.
    pub encryption_key: String,
    /// Optional cap on stored entries.
    pub max_entries: Option<usize>,
}

impl ServerConfig {
    /// Creates a configuration with the default bind address.
    pub fn new(db_path: impl Into<PathBuf>, encryption_key: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::new(IpFamily::Tcp4.wildcard(), DEFAULT_PORT),
            db_path: db_path.into(),
            encryption_key: encryption_key.into(),
            max_entries: None,
        }
    }

    /// Sets the bind address.
    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the entry cap.
    #[must_use]
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("encryption_key", &"[REDACTED]")
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
