//! cipherlogd
//!
//! API server persisting json key-value streams, each object in the
//! format `{"key_string":"base64_encoded_byte_slice"}`, into an embedded
//! encrypted append-log store.
//!
//! # Usage
//!
//! ```text
//! $ cipherlogd --db ~/test.db
//! INFO successfully opened persistence file path=/home/user/test.db
//! INFO persistence file contains 0 keys path=/home/user/test.db
//! INFO serving tcp4 http requests addr=0.0.0.0:11185
//! ```
//!
//! The store encryption key is read from the environment variable named
//! by `--encryption-key-env` (trimmed); when unset or empty, a built-in
//! default key is used.

use clap::Parser;
use cipherlog_server::{resolve_bind_addr, IpFamily, Server, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Built-in fallback encryption key, used when the key environment
/// variable is unset or empty.
const DEFAULT_ENCRYPTION_KEY: &str = "qL8vRw2nYxK0dTzUfHb5mJcPe7NsVaG4iAoD1EhXgSk";

/// Default environment variable holding the encryption key.
const DEFAULT_ENCRYPTION_KEY_ENV: &str = "CIPHERLOG_ENCRYPTION_KEY";

/// HTTP persister daemon for encrypted key-value streams.
#[derive(Parser)]
#[command(name = "cipherlogd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind the http server to (`:port` binds the wildcard
    /// address of the selected protocol family)
    #[arg(long, default_value = ":11185")]
    addr: String,

    /// Network protocol family to listen on (tcp, tcp4 or tcp6)
    #[arg(long, default_value = "tcp4")]
    protocol: IpFamily,

    /// Persistence file used as backend for the storage API
    #[arg(long, default_value = "cipherlog.db")]
    db: PathBuf,

    /// Environment variable to retrieve the store encryption key from
    #[arg(long, default_value = DEFAULT_ENCRYPTION_KEY_ENV)]
    encryption_key_env: String,

    /// Optional cap on the number of stored entries
    #[arg(long)]
    max_entries: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn encryption_key(env_name: &str) -> String {
    match std::env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => DEFAULT_ENCRYPTION_KEY.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bind_addr = resolve_bind_addr(cli.protocol, &cli.addr)?;
    let key = encryption_key(&cli.encryption_key_env);

    let mut config = ServerConfig::new(cli.db, key).with_bind_addr(bind_addr);
    if let Some(max) = cli.max_entries {
        config = config.with_max_entries(max);
    }

    let server = Server::bind(config).await?;
    tracing::info!(
        addr = %server.local_addr()?,
        "serving {} http requests",
        cli.protocol
    );

    server.serve().await?;
    tracing::info!("OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_key() {
        assert_eq!(
            encryption_key("CIPHERLOG_TEST_UNSET_VARIABLE"),
            DEFAULT_ENCRYPTION_KEY
        );
    }

    #[test]
    fn trims_key_from_environment() {
        std::env::set_var("CIPHERLOG_TEST_KEY", "  padded-key  ");
        assert_eq!(encryption_key("CIPHERLOG_TEST_KEY"), "padded-key");
        std::env::remove_var("CIPHERLOG_TEST_KEY");
    }

    #[test]
    fn cli_parses_defaults() {
        let cli = Cli::parse_from(["cipherlogd"]);
        assert_eq!(cli.addr, ":11185");
        assert_eq!(cli.db, PathBuf::from("cipherlog.db"));
        assert_eq!(cli.encryption_key_env, DEFAULT_ENCRYPTION_KEY_ENV);
        assert!(!cli.verbose);
    }
}
