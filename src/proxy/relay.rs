//! TCP relay over a throttled upstream link.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::LinkConfig;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener, ListenerError, ThrottledDialer};
use crate::observability::metrics;
use crate::throttle::ThrottleError;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("invalid link settings: {0}")]
    Throttle(#[from] ThrottleError),

    #[error("failed to dial upstream {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("relay I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Accepts clients and relays each one to the upstream through a throttled link.
pub struct RelayServer {
    config: ArcSwap<LinkConfig>,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl RelayServer {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            tracker: ConnectionTracker::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Configuration that the next accepted connection will use.
    pub fn current_config(&self) -> Arc<LinkConfig> {
        self.config.load_full()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Replace the configuration for future connections.
    pub fn apply_config(&self, new_config: LinkConfig) {
        let current = self.config.load();
        if current.listener != new_config.listener {
            tracing::warn!("Listener settings changed; a restart is needed for them to apply");
        }
        tracing::info!(
            upstream = %new_config.upstream.address,
            rate_budget = new_config.throttle.rate_budget,
            quantum_ms = new_config.throttle.quantum_ms,
            "Applying new link configuration"
        );
        self.config.store(Arc::new(new_config));
    }

    /// Run the accept loop until `shutdown` fires.
    ///
    /// Open connections are closed on shutdown and given `drain_timeout` to
    /// finish tearing down.
    pub async fn run(
        &self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<LinkConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RelayError> {
        let (stop_tx, stop_rx) = watch::channel(false);

        tracing::info!(
            address = ?listener.local_addr().ok(),
            upstream = %self.config.load().upstream.address,
            "Relay started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Relay shutting down, no longer accepting connections");
                    break;
                }
                Some(new_config) = config_updates.recv() => {
                    self.apply_config(new_config);
                }
                accepted = listener.accept() => {
                    let (client, peer_addr, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    self.spawn_connection(client, peer_addr, permit, stop_rx.clone());
                }
            }
        }

        drop(listener);
        stop_tx.send_replace(true);

        let open = self.tracker.active_count();
        if self.tracker.wait_for_drain(self.drain_timeout).await {
            tracing::info!(closed = open, "All relayed connections closed");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout reached with connections still open"
            );
        }
        Ok(())
    }

    fn spawn_connection(
        &self,
        client: TcpStream,
        peer_addr: SocketAddr,
        permit: ConnectionPermit,
        stop: watch::Receiver<bool>,
    ) {
        let config = self.config.load_full();
        let guard = self.tracker.track();
        metrics::record_relay_connection();

        tokio::spawn(async move {
            let connection_id = guard.id();
            match relay_connection(client, &config, stop).await {
                Ok((sent, received)) => tracing::debug!(
                    connection_id = %connection_id,
                    peer_addr = %peer_addr,
                    bytes_sent = sent,
                    bytes_received = received,
                    "Relay finished"
                ),
                Err(e) => tracing::warn!(
                    connection_id = %connection_id,
                    peer_addr = %peer_addr,
                    error = %e,
                    "Relay failed"
                ),
            }
            drop(permit);
            drop(guard);
        });
    }
}

/// Relay one client until either side finishes or `stop` fires.
///
/// Returns the bytes sent to and received from the upstream.
async fn relay_connection(
    mut client: TcpStream,
    config: &LinkConfig,
    mut stop: watch::Receiver<bool>,
) -> Result<(u64, u64), RelayError> {
    client.set_nodelay(true)?;

    let dialer = ThrottledDialer::new(config.throttle.settings())?
        .with_connect_timeout(config.upstream.connect_timeout());
    let mut upstream =
        dialer
            .connect(&config.upstream.address)
            .await
            .map_err(|source| RelayError::Dial {
                address: config.upstream.address.clone(),
                source,
            })?;

    tracing::debug!(
        connection_id = %upstream.id(),
        upstream = %config.upstream.address,
        "Upstream link established"
    );

    let copied = tokio::select! {
        res = tokio::io::copy_bidirectional(&mut client, &mut upstream) => Some(res),
        _ = stop.wait_for(|stopped| *stopped) => None,
    };

    let closed = upstream.close().await;
    match copied {
        Some(res) => {
            res?;
        }
        None => tracing::debug!(connection_id = %upstream.id(), "Relay stopped by shutdown"),
    }
    if let Err(e) = closed {
        tracing::debug!(connection_id = %upstream.id(), error = %e, "Upstream close reported an error");
    }

    Ok((upstream.bytes_sent(), upstream.bytes_received()))
}
