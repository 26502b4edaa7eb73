//! Relay server: accept loop, config reload and shutdown.
//!
//! # Responsibilities
//! - Accept client connections under the connection limit
//! - Spawn one relay task per connection
//! - Swap in reloaded configuration atomically
//! - Stop accepting on shutdown and drain running sessions

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use crate::config::RelayConfig;
use crate::net::connection::SessionTracker;
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::relay::driver::{serve_connection, RelayContext};

/// Shared state, also handed to the admin API.
#[derive(Clone)]
pub struct AppState {
    /// The live configuration generation.
    pub inner: Arc<ArcSwap<RelayContext>>,
    pub sessions: SessionTracker,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(RelayContext::from_config(config))),
            sessions: SessionTracker::new(),
        }
    }

    /// Replace the live configuration. Running sessions keep the old one.
    pub fn reload(&self, config: RelayConfig) {
        let routes = config.routes.len();
        self.inner.store(Arc::new(RelayContext::from_config(config)));
        tracing::info!(routes, "Configuration reloaded");
    }

    pub fn config(&self) -> Arc<RelayConfig> {
        Arc::clone(&self.inner.load().config)
    }
}

/// The streaming relay server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn sessions(&self) -> SessionTracker {
        self.state.sessions.clone()
    }

    /// Run until `shutdown` fires, then wait up to the configured grace
    /// period for running sessions.
    ///
    /// Listener settings are read once; reloads affect routes, origin,
    /// limits and credentials for new sessions.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<RelayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let max_connections = self.state.config().listener.max_connections;
        let listener = Listener::new(listener, max_connections);

        tracing::info!(address = %addr, max_connections, "Relay server starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
                Some(config) = config_updates.recv() => self.state.reload(config),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_session(stream, peer, permit),
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }
        drop(listener);

        let grace = Duration::from_secs(self.state.config().lifecycle.shutdown_grace_secs);
        if !self.state.sessions.wait_idle(grace).await {
            tracing::warn!(
                active_sessions = self.state.sessions.active_count(),
                grace_secs = grace.as_secs(),
                "Shutdown grace period elapsed with sessions still running"
            );
        }

        tracing::info!("Relay server stopped");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let ctx = self.state.inner.load_full();
        let guard = self.state.sessions.track();

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = serve_connection(stream, peer, guard.id(), ctx).await;
            tracing::trace!(session_id = %guard.id(), outcome = %outcome, "Connection finished");
            drop(guard);
        });
    }
}
