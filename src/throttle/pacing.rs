//! Quantum-paced copy loop.
//!
//! # Algorithm
//! ```text
//! every quantum:
//!     remaining = rate budget
//!     while remaining > 0:
//!         moved = copy(source → sink, at most remaining)   // blocks on source
//!         moved == 0  → source at end of stream, stop
//!         remaining -= moved
//! ```
//!
//! Ticks that fall due while a copy is still blocked are not queued: one
//! late tick fires as soon as the loop asks for it, the rest are dropped and
//! the schedule realigns to the next whole quantum.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::conduit::PipeCloser;
use crate::observability::metrics;
use crate::throttle::budget::Direction;

const COPY_BUF_SIZE: usize = 16 * 1024;

/// Why a pacing loop stopped.
#[derive(Debug)]
pub enum PacingOutcome {
    /// The owning connection was closed or dropped.
    Stopped,
    /// The source reached end of stream.
    EndOfStream,
    /// The source or sink failed.
    Failed(io::Error),
}

impl PacingOutcome {
    fn label(&self) -> &'static str {
        match self {
            PacingOutcome::Stopped => "stopped",
            PacingOutcome::EndOfStream => "end_of_stream",
            PacingOutcome::Failed(_) => "failed",
        }
    }
}

/// Moves bytes from `source` to `sink`, at most `rate_budget` per quantum.
///
/// On exit the conduit end behind `peer` is closed so that the caller on
/// the other side of the conduit observes the outcome: plain EOF after end
/// of stream, the I/O error after a failure.
pub struct Pacer<R, W> {
    direction: Direction,
    rate_budget: u64,
    quantum: Duration,
    source: R,
    sink: W,
    peer: PipeCloser,
    moved: Arc<AtomicU64>,
    failure: Arc<OnceLock<io::Error>>,
}

impl<R, W> Pacer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        direction: Direction,
        rate_budget: u64,
        quantum: Duration,
        source: R,
        sink: W,
        peer: PipeCloser,
    ) -> Self {
        Self {
            direction,
            rate_budget,
            quantum,
            source,
            sink,
            peer,
            moved: Arc::new(AtomicU64::new(0)),
            failure: Arc::new(OnceLock::new()),
        }
    }

    /// Running total of bytes this pacer has delivered to its sink.
    pub fn moved(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.moved)
    }

    /// The error that ended this pacer, set before the peer end is closed.
    pub fn failure(&self) -> Arc<OnceLock<io::Error>> {
        Arc::clone(&self.failure)
    }

    /// Pace until the source ends, an I/O error occurs, or `stop` fires.
    ///
    /// `stop` fires when it reads `true` or when its sender is dropped.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> PacingOutcome {
        let outcome = tokio::select! {
            outcome = self.pace() => outcome,
            _ = stop.wait_for(|stopped| *stopped) => PacingOutcome::Stopped,
        };

        match &outcome {
            PacingOutcome::Failed(e) => {
                tracing::debug!(direction = %self.direction, error = %e, "Pacing failed");
                let _ = self.failure.set(io::Error::new(e.kind(), e.to_string()));
                let _ = self.peer.close_with_error(e);
            }
            PacingOutcome::EndOfStream => {
                tracing::debug!(direction = %self.direction, "Pacing source exhausted");
                if let Err(e) = self.sink.shutdown().await {
                    tracing::debug!(direction = %self.direction, error = %e, "Sink shutdown failed");
                }
                let _ = self.peer.close();
            }
            PacingOutcome::Stopped => {
                tracing::debug!(direction = %self.direction, "Pacing stopped");
                let _ = self.peer.close();
            }
        }

        metrics::record_pacing_exit(self.direction.as_str(), outcome.label());
        outcome
    }

    async fn pace(&mut self) -> PacingOutcome {
        let mut ticker = time::interval_at(Instant::now() + self.quantum, self.quantum);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = vec![0u8; COPY_BUF_SIZE];

        loop {
            ticker.tick().await;
            metrics::record_tick(self.direction.as_str());

            let mut remaining = self.rate_budget;
            while remaining > 0 {
                let moved = match self.copy_bounded(&mut buf, remaining).await {
                    Ok(0) => return PacingOutcome::EndOfStream,
                    Ok(moved) => moved,
                    Err(e) => return PacingOutcome::Failed(e),
                };
                remaining -= moved;
            }

            tracing::trace!(
                direction = %self.direction,
                budget = self.rate_budget,
                "Quantum budget spent"
            );
        }
    }

    /// Move one read's worth of at most `limit` bytes from source to sink.
    ///
    /// Blocks until the source has data. Returns 0 only at end of stream.
    async fn copy_bounded(&mut self, buf: &mut [u8], limit: u64) -> io::Result<u64> {
        let want = usize::try_from(limit).map_or(buf.len(), |limit| limit.min(buf.len()));
        let n = self.source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Ok(0);
        }

        self.sink.write_all(&buf[..n]).await?;
        self.sink.flush().await?;

        let moved = n as u64;
        self.moved.fetch_add(moved, Ordering::Relaxed);
        metrics::record_bytes(self.direction.as_str(), moved);
        Ok(moved)
    }
}
