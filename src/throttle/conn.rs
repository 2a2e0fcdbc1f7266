//! Bandwidth-throttled connection.
//!
//! # Data Flow
//! ```text
//! write ─▶ outbound pipe ─▶ [outbound pacer] ─▶ wrapped.write
//! read  ◀─ inbound pipe  ◀─ [inbound pacer]  ◀─ wrapped.read
//! addresses, deadlines ───────────────────────▶ wrapped (direct)
//! ```
//!
//! The wrapped connection sits behind a mutex that is taken only for the
//! duration of a single poll, so the two pacers and the metadata calls never
//! hold it across an await point.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::conduit::{pipe, PipeCloser, PipeReader, PipeWriter};
use crate::net::connection::{Connection, ConnectionId};
use crate::throttle::budget::{Direction, ThrottleError, ThrottleSettings};
use crate::throttle::pacing::{Pacer, PacingOutcome};

/// The wrapped connection, shared by the decorator and both pacers.
///
/// `None` once closed; the stream itself is dropped at that point.
struct Wrapped<C> {
    conn: Mutex<Option<C>>,
}

impl<C: Connection> Wrapped<C> {
    fn new(conn: C) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Option<C>>> {
        self.conn
            .lock()
            .map_err(|_| io::Error::other("wrapped connection lock poisoned"))
    }

    /// Run `f` against the open connection.
    fn with<T>(&self, f: impl FnOnce(&mut C) -> T) -> io::Result<T> {
        match self.lock()?.as_mut() {
            Some(conn) => Ok(f(conn)),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "use of closed network connection",
            )),
        }
    }

    /// Shut the stream down and drop it. Fails if already closed.
    async fn close(&self) -> io::Result<()> {
        self.with(|_| ())?;
        let shutdown = poll_fn(|cx| self.with(|conn| Pin::new(conn).poll_shutdown(cx))?).await;
        drop(self.lock()?.take());

        match shutdown {
            // The peer already tore the connection down.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Read side of the wrapped connection, owned by the inbound pacer.
struct WrappedReader<C>(Arc<Wrapped<C>>);

impl<C: Connection> AsyncRead for WrappedReader<C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.0.with(|conn| Pin::new(conn).poll_read(cx, buf))?
    }
}

/// Write side of the wrapped connection, owned by the outbound pacer.
struct WrappedWriter<C>(Arc<Wrapped<C>>);

impl<C: Connection> AsyncWrite for WrappedWriter<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.with(|conn| Pin::new(conn).poll_write(cx, data))?
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.0.with(|conn| Pin::new(conn).poll_flush(cx))?
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.0.with(|conn| Pin::new(conn).poll_shutdown(cx))?
    }
}

/// A connection whose reads and writes are each capped at a fixed number
/// of bytes per quantum.
///
/// Construction spawns two pacing tasks, so it must happen inside a tokio
/// runtime. Call [`ThrottledConn::close`] to tear everything down and learn
/// whether it went cleanly; dropping the connection only stops the pacers.
pub struct ThrottledConn<C: Connection> {
    id: ConnectionId,
    settings: ThrottleSettings,
    wrapped: Arc<Wrapped<C>>,
    /// Caller side of the inbound conduit.
    reader: PipeReader,
    /// Caller side of the outbound conduit.
    writer: PipeWriter,
    /// Pacer side of the inbound conduit.
    inbound_writer: PipeCloser,
    /// Pacer side of the outbound conduit.
    outbound_reader: PipeCloser,
    stop: watch::Sender<bool>,
    outbound_task: Option<JoinHandle<PacingOutcome>>,
    inbound_task: Option<JoinHandle<PacingOutcome>>,
    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    outbound_failure: Arc<OnceLock<io::Error>>,
    inbound_failure: Arc<OnceLock<io::Error>>,
}

impl<C: Connection> ThrottledConn<C> {
    /// Wrap `conn`, taking ownership of it.
    pub fn new(settings: ThrottleSettings, conn: C) -> Result<Self, ThrottleError> {
        settings.validate()?;

        let id = ConnectionId::new();
        let wrapped = Arc::new(Wrapped::new(conn));
        let (inbound_reader, inbound_writer) = pipe();
        let (outbound_reader, outbound_writer) = pipe();
        let (stop, stop_rx) = watch::channel(false);

        let inbound_closer = inbound_writer.closer();
        let outbound_closer = outbound_reader.closer();

        let outbound = Pacer::new(
            Direction::Outbound,
            settings.outbound_budget,
            settings.quantum,
            outbound_reader,
            WrappedWriter(Arc::clone(&wrapped)),
            outbound_closer.clone(),
        );
        let inbound = Pacer::new(
            Direction::Inbound,
            settings.inbound_budget,
            settings.quantum,
            WrappedReader(Arc::clone(&wrapped)),
            inbound_writer,
            inbound_closer.clone(),
        );
        let bytes_sent = outbound.moved();
        let bytes_received = inbound.moved();
        let outbound_failure = outbound.failure();
        let inbound_failure = inbound.failure();

        let outbound_task = tokio::spawn(outbound.run(stop_rx.clone()));
        let inbound_task = tokio::spawn(inbound.run(stop_rx));

        tracing::debug!(
            connection_id = %id,
            outbound_budget = settings.outbound_budget,
            inbound_budget = settings.inbound_budget,
            quantum_ms = settings.quantum.as_millis() as u64,
            "Throttled connection opened"
        );

        Ok(Self {
            id,
            settings,
            wrapped,
            reader: inbound_reader,
            writer: outbound_writer,
            inbound_writer: inbound_closer,
            outbound_reader: outbound_closer,
            stop,
            outbound_task: Some(outbound_task),
            inbound_task: Some(inbound_task),
            bytes_sent,
            bytes_received,
            outbound_failure,
            inbound_failure,
        })
    }

    /// Same `rate_budget` bytes per `quantum` in both directions.
    pub fn with_rate(rate_budget: u64, quantum: Duration, conn: C) -> Result<Self, ThrottleError> {
        Self::new(ThrottleSettings::symmetric(rate_budget, quantum), conn)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn settings(&self) -> ThrottleSettings {
        self.settings
    }

    /// Bytes the outbound pacer has delivered to the wrapped connection.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Bytes the inbound pacer has delivered toward the caller.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Whether either pacing task is still running.
    pub fn is_pacing(&self) -> bool {
        [&self.outbound_task, &self.inbound_task]
            .into_iter()
            .flatten()
            .any(|task| !task.is_finished())
    }

    /// Tear down both conduits and the wrapped connection.
    ///
    /// Every step runs even if an earlier one failed. Waits for both pacing
    /// tasks to exit. If a pacer had already failed before the close began,
    /// that error is returned; otherwise the first teardown failure is.
    /// Closing twice reports the wrapped connection as already closed.
    pub async fn close(&mut self) -> io::Result<()> {
        let first_close = self.outbound_task.is_some() || self.inbound_task.is_some();
        let original = [&self.outbound_failure, &self.inbound_failure]
            .into_iter()
            .find_map(|failure| failure.get())
            .filter(|_| first_close)
            .map(|e| io::Error::new(e.kind(), e.to_string()));

        let mut results = vec![
            self.writer.close(),
            self.inbound_writer.close(),
            self.reader.close(),
            self.outbound_reader.close(),
        ];
        self.stop.send_replace(true);
        results.push(self.wrapped.close().await);

        for (direction, task) in [
            (Direction::Outbound, self.outbound_task.take()),
            (Direction::Inbound, self.inbound_task.take()),
        ] {
            let Some(task) = task else { continue };
            match task.await {
                Ok(outcome) => {
                    tracing::trace!(connection_id = %self.id, %direction, ?outcome, "Pacer joined");
                }
                Err(e) => {
                    tracing::warn!(connection_id = %self.id, %direction, error = %e, "Pacer task failed");
                }
            }
        }

        tracing::debug!(
            connection_id = %self.id,
            bytes_sent = self.bytes_sent(),
            bytes_received = self.bytes_received(),
            "Throttled connection closed"
        );

        match original {
            Some(e) => Err(e),
            None => results.into_iter().find(Result::is_err).unwrap_or(Ok(())),
        }
    }
}

impl<C: Connection> AsyncRead for ThrottledConn<C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl<C: Connection> AsyncWrite for ThrottledConn<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, data)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    /// Ends the outbound direction. Bytes already handed over are still
    /// paced out before the wrapped connection's write side is shut down.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

impl<C: Connection> Connection for ThrottledConn<C> {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.wrapped.with(|conn| conn.local_addr())?
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.wrapped.with(|conn| conn.peer_addr())?
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.wrapped.with(|conn| conn.set_read_deadline(deadline))?
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.wrapped.with(|conn| conn.set_write_deadline(deadline))?
    }
}

impl<C: Connection> std::fmt::Debug for ThrottledConn<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledConn")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("bytes_sent", &self.bytes_sent())
            .field("bytes_received", &self.bytes_received())
            .finish()
    }
}
