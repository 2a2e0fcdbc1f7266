//! Synchronous in-memory pipe.
//!
//! A write on [`PipeWriter`] waits until the paired [`PipeReader`] is parked
//! in a read, then hands over at most as many bytes as that read asked for.
//! Nothing is taken from the writer's buffer until the write returns ready,
//! so a cancelled write leaves no bytes behind. The pipe never holds more
//! than the one transfer currently in flight; `flush` waits for it to drain.
//!
//! # Closure
//! ```text
//! writer.close()                 → reader sees EOF
//! writer.close_with_error(err)   → reader sees err
//! reader.close()                 → writer sees BrokenPipe
//! reader.close_with_error(err)   → writer sees err
//! ```
//! An end that was closed locally always fails with BrokenPipe. The first
//! close of an end wins; later closes of the same end are no-ops.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const CLOSED_PIPE: &str = "io: read/write on closed pipe";

/// Create a connected pair of pipe ends.
pub fn pipe() -> (PipeReader, PipeWriter) {
    let shared = Arc::new(Shared::default());
    (
        PipeReader {
            shared: Arc::clone(&shared),
        },
        PipeWriter { shared },
    )
}

/// Terminal condition recorded on close.
///
/// `io::Error` is not `Clone`, so the kind and message are kept and a fresh
/// error is produced for every observer.
#[derive(Debug, Clone)]
struct Terminal {
    kind: io::ErrorKind,
    message: String,
}

impl Terminal {
    fn from_error(err: &io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    fn closed_pipe() -> Self {
        Self {
            kind: io::ErrorKind::BrokenPipe,
            message: CLOSED_PIPE.to_string(),
        }
    }

    fn to_error(&self) -> io::Error {
        io::Error::new(self.kind, self.message.clone())
    }
}

/// Close state of one end.
#[derive(Debug, Clone, Default)]
enum EndState {
    #[default]
    Open,
    /// `None` means a plain close (EOF for readers, BrokenPipe for writers).
    Closed(Option<Terminal>),
}

impl EndState {
    fn is_closed(&self) -> bool {
        matches!(self, EndState::Closed(_))
    }
}

#[derive(Debug, Default)]
struct State {
    /// Unread bytes of the transfer currently in flight.
    data: Vec<u8>,
    /// Capacity of the read parked waiting for data.
    read_want: Option<usize>,
    reader: EndState,
    writer: EndState,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

impl State {
    fn wake_all(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }

    /// Error a writer observes, if the pipe no longer accepts writes.
    fn write_error(&self) -> Option<io::Error> {
        if self.writer.is_closed() {
            return Some(Terminal::closed_pipe().to_error());
        }
        match &self.reader {
            EndState::Open => None,
            EndState::Closed(Some(terminal)) => Some(terminal.to_error()),
            EndState::Closed(None) => Some(Terminal::closed_pipe().to_error()),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn close(&self, end: End, err: Option<&io::Error>) -> io::Result<()> {
        let mut state = self.lock();
        let slot = match end {
            End::Read => &mut state.reader,
            End::Write => &mut state.writer,
        };
        if !slot.is_closed() {
            *slot = EndState::Closed(err.map(Terminal::from_error));
        }
        if end == End::Read {
            state.data.clear();
            state.read_want = None;
        }
        state.wake_all();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Read,
    Write,
}

/// Read end of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Close the read end. Blocked and future writes fail with BrokenPipe.
    pub fn close(&self) -> io::Result<()> {
        self.shared.close(End::Read, None)
    }

    /// Close the read end, handing `err` to blocked and future writes.
    pub fn close_with_error(&self, err: &io::Error) -> io::Result<()> {
        self.shared.close(End::Read, Some(err))
    }

    /// A handle that can close this end without owning it.
    pub fn closer(&self) -> PipeCloser {
        PipeCloser {
            shared: Arc::clone(&self.shared),
            end: End::Read,
        }
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.shared.lock();

        if state.reader.is_closed() {
            return Poll::Ready(Err(Terminal::closed_pipe().to_error()));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if !state.data.is_empty() {
            state.read_want = None;
            let n = buf.remaining().min(state.data.len());
            buf.put_slice(&state.data[..n]);
            state.data.drain(..n);
            if state.data.is_empty() {
                if let Some(waker) = state.write_waker.take() {
                    waker.wake();
                }
            }
            return Poll::Ready(Ok(()));
        }

        if let EndState::Closed(terminal) = &state.writer {
            return Poll::Ready(match terminal {
                None => Ok(()),
                Some(terminal) => Err(terminal.to_error()),
            });
        }

        state.read_want = Some(buf.remaining());
        state.read_waker = Some(cx.waker().clone());
        if let Some(waker) = state.write_waker.take() {
            waker.wake();
        }
        Poll::Pending
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Write end of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Close the write end. The reader sees EOF once it asks for more data.
    pub fn close(&self) -> io::Result<()> {
        self.shared.close(End::Write, None)
    }

    /// Close the write end, handing `err` to blocked and future reads.
    pub fn close_with_error(&self, err: &io::Error) -> io::Result<()> {
        self.shared.close(End::Write, Some(err))
    }

    /// A handle that can close this end without owning it.
    pub fn closer(&self) -> PipeCloser {
        PipeCloser {
            shared: Arc::clone(&self.shared),
            end: End::Write,
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.shared.lock();

        if let Some(err) = state.write_error() {
            return Poll::Ready(Err(err));
        }
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let parked_read = state.read_want.filter(|_| state.data.is_empty());
        match parked_read {
            Some(want) => {
                let n = want.min(data.len());
                state.data.extend_from_slice(&data[..n]);
                state.read_want = None;
                if let Some(waker) = state.read_waker.take() {
                    waker.wake();
                }
                Poll::Ready(Ok(n))
            }
            None => {
                state.write_waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    /// Waits until the reader has drained the transfer in flight.
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.shared.lock();
        if state.data.is_empty() {
            return Poll::Ready(Ok(()));
        }
        if let Some(err) = state.write_error() {
            return Poll::Ready(Err(err));
        }
        state.write_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.close())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Closes one end of a pipe from outside the task that owns it.
#[derive(Debug, Clone)]
pub struct PipeCloser {
    shared: Arc<Shared>,
    end: End,
}

impl PipeCloser {
    pub fn close(&self) -> io::Result<()> {
        self.shared.close(self.end, None)
    }

    pub fn close_with_error(&self, err: &io::Error) -> io::Result<()> {
        self.shared.close(self.end, Some(err))
    }
}
