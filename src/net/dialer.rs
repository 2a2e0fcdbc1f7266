//! Dialer that hands out throttled connections.
//!
//! Anything that dials TCP can swap in [`ThrottledDialer::connect`] to get a
//! connection that behaves like the raw one but over a constrained link.

use std::io;
use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::net::deadline::DeadlineStream;
use crate::throttle::{ThrottleError, ThrottleSettings, ThrottledConn};

/// Throttled connection over TCP, as produced by [`ThrottledDialer`].
pub type ThrottledTcp = ThrottledConn<DeadlineStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ThrottledDialer {
    settings: ThrottleSettings,
    connect_timeout: Duration,
}

impl ThrottledDialer {
    pub fn new(settings: ThrottleSettings) -> Result<Self, ThrottleError> {
        settings.validate()?;
        Ok(Self {
            settings,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn settings(&self) -> ThrottleSettings {
        self.settings
    }

    /// Connect to `addr` and wrap the stream.
    pub async fn connect<A: ToSocketAddrs>(&self, addr: A) -> io::Result<ThrottledTcp> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;

        tracing::debug!(
            peer_addr = ?stream.peer_addr().ok(),
            "Dialed upstream"
        );

        ThrottledConn::new(self.settings, DeadlineStream::new(stream))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}
