//! Accept loop, handler lifecycle, and shutdown sequencing.
//!
//! [`Server::bind`] opens the listening socket (with `SO_REUSEADDR`, so a
//! restart does not trip over a lingering `TIME_WAIT` binding) and builds
//! the configured log backend. [`Server::run`] then accepts connections
//! until the shutdown flag flips, spawning one handler task per client into
//! a [`JoinSet`].
//!
//! Completed handlers are reaped opportunistically after every accept by
//! draining the join set, so finished per-connection state never
//! accumulates. At shutdown the remaining handlers are cancelled and
//! joined, the timestamp writer is awaited, and the backend's shutdown hook
//! runs (which removes the on-disk data file for the in-process backend).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::backend::{self, LogBackend};
use crate::config::Settings;
use crate::network::connection::handle_connection;
use crate::timestamp::run_injector;

/// Listen backlog, matching the transport contract.
const BACKLOG: u32 = 10;

/// A bound, not-yet-running server.
pub struct Server {
    listener: TcpListener,
    backend: Arc<dyn LogBackend>,
    timestamp_period: Option<Duration>,
}

impl Server {
    /// Binds the listen socket and builds the configured backend.
    ///
    /// Must be called within a tokio runtime. Binding or backend failures
    /// here are initialisation errors; the caller logs them and exits
    /// non-zero.
    pub fn bind(settings: &Settings) -> Result<Self> {
        let backend = backend::for_settings(settings).context("failed to open log backend")?;

        let addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.port)
            .parse()
            .context("invalid listen address")?;
        let socket = TcpSocket::new_v4().context("failed to create listen socket")?;
        socket
            .set_reuseaddr(true)
            .context("failed to set SO_REUSEADDR")?;
        socket.bind(addr).context("failed to bind listen socket")?;
        let listener = socket.listen(BACKLOG).context("failed to listen")?;
        info!("Listening on {}", listener.local_addr()?);

        let timestamp_period = (backend.timestamps_enabled()
            && settings.timestamp_interval_secs > 0)
            .then(|| Duration::from_secs(settings.timestamp_interval_secs));

        Ok(Self {
            listener,
            backend,
            timestamp_period,
        })
    }

    /// The bound listen address (useful when the port was ephemeral).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `shutdown` flips, then tears everything
    /// down in order: outstanding handlers, timestamp writer, backend.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut handlers: JoinSet<()> = JoinSet::new();

        let injector = self.timestamp_period.map(|period| {
            tokio::spawn(run_injector(
                Arc::clone(&self.backend),
                period,
                shutdown.clone(),
            ))
        });

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            info!("Accepted connection from {}", peer.ip());
                            handlers.spawn(handle_connection(
                                socket,
                                peer,
                                Arc::clone(&self.backend),
                            ));
                        }
                        Err(err) => error!("accept failed: {}", err),
                    }
                }
                _ = shutdown.changed() => break,
            }

            // Reap handlers that have already finished.
            while let Some(joined) = handlers.try_join_next() {
                if let Err(err) = joined {
                    if err.is_panic() {
                        error!("connection handler panicked: {}", err);
                    }
                }
            }
        }

        // Cancel outstanding handlers and join them all.
        handlers.shutdown().await;

        if let Some(injector) = injector {
            if let Err(err) = injector.await {
                warn!("timestamp writer did not stop cleanly: {}", err);
            }
        }

        self.backend
            .shutdown()
            .context("failed to release log backend")?;
        info!("server stopped");
        Ok(())
    }
}

/// Installs SIGINT/SIGTERM listeners and returns the shutdown flag they
/// flip. The flag is a watch channel: loops observe the change between
/// iterations, the signal task does nothing else.
pub fn shutdown_signal() -> Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);

    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        info!("Caught signal, exiting");
        let _ = tx.send(true);
    });

    Ok(rx)
}
