//! Service lifecycle: listener ownership and coordinated shutdown.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::router::{router, AppState};
use cipherlog_store::{Store, StoreOptions};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Why the server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Interrupt signal (ctrl-c / SIGINT).
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// A [`ShutdownHandle`] requested the stop.
    Requested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt signal"),
            Self::Terminate => f.write_str("terminate signal"),
            Self::Requested => f.write_str("shutdown requested"),
        }
    }
}

/// Handle for stopping a running server from elsewhere.
///
/// Cloneable and cheap; the first shutdown request (or signal) wins, later
/// ones are no-ops.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    /// Requests a graceful shutdown.
    pub fn shutdown(&self) {
        self.notify.notify_one();
    }
}

/// The API server: an open store plus a bound listener.
///
/// [`Server::bind`] opens the store and binds the listener eagerly so
/// configuration errors surface before [`Server::serve`] starts blocking.
/// `serve` runs until a signal arrives, a [`ShutdownHandle`] fires, or the
/// listener fails; whichever stop reason is observed first is the one
/// logged. The store is closed on every exit path.
pub struct Server {
    listener: TcpListener,
    store: Arc<Store>,
    notify: Arc<Notify>,
}

impl Server {
    /// Opens the store and binds the listener.
    ///
    /// Binding to port 0 is supported; use [`Server::local_addr`] for the
    /// actual address.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened (locked, wrong key,
    /// corrupt file) or the listener cannot bind.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let mut options = StoreOptions::default();
        if let Some(max) = config.max_entries {
            options = options.with_max_entries(max);
        }

        let store = Store::open(&config.db_path, &config.encryption_key, options)?;
        tracing::info!(
            path = %config.db_path.display(),
            "successfully opened persistence file"
        );

        let count = store.len()?;
        let plural = if count == 1 { "" } else { "s" };
        tracing::info!(
            path = %config.db_path.display(),
            "persistence file contains {count} key{plural}"
        );

        let listener = TcpListener::bind(config.bind_addr).await?;

        Ok(Self {
            listener,
            store: Arc::new(store),
            notify: Arc::new(Notify::new()),
        })
    }

    /// Returns the address the listener is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be read.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns a handle that stops this server when fired.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the shared store (used by tests and embedders).
    #[must_use]
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Serves requests until stopped, then closes the store.
    ///
    /// Blocks until a signal, a shutdown handle, or a listener error ends
    /// the server. A clean stop returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the terminal listener error, if any.
    pub async fn serve(self) -> ServerResult<()> {
        let app = router(AppState::new(Arc::clone(&self.store)));

        let reason: Arc<Mutex<Option<StopReason>>> = Arc::new(Mutex::new(None));
        let shutdown = {
            let notify = Arc::clone(&self.notify);
            let reason = Arc::clone(&reason);
            async move {
                let observed = wait_for_stop(notify).await;
                tracing::info!(reason = %observed, "shutting down");
                *reason.lock() = Some(observed);
            }
        };

        let served = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        // Closed on every exit path, clean or not.
        self.store.close();
        served?;

        if let Some(observed) = reason.lock().take() {
            tracing::info!(reason = %observed, "server stopped");
        }
        Ok(())
    }
}

/// Resolves to the first stop condition observed.
async fn wait_for_stop(notify: Arc<Notify>) -> StopReason {
    let ctrl_c = async {
        // If the handler cannot install, signals simply never fire.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => StopReason::Interrupt,
        () = terminate => StopReason::Terminate,
        () = notify.notified() => StopReason::Requested,
    }
}
