//! Read and write deadlines for tokio streams.
//!
//! Once a deadline passes, pending and future operations on that side fail
//! with `ErrorKind::TimedOut` until the deadline is cleared or moved.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Instant, Sleep};

/// Stream wrapper that enforces optional read and write deadlines.
#[derive(Debug)]
pub struct DeadlineStream<S> {
    inner: S,
    read_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
    // Tasks parked in a pending read or write, re-polled when a deadline moves.
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

impl<S> DeadlineStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            read_deadline: None,
            write_deadline: None,
            read_waker: None,
            write_waker: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// `None` clears the read deadline.
    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline.map(|at| Box::pin(sleep_until(at)));
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    /// `None` clears the write deadline.
    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline = deadline.map(|at| Box::pin(sleep_until(at)));
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }
}

fn expired(deadline: &mut Option<Pin<Box<Sleep>>>, cx: &mut Context<'_>) -> bool {
    match deadline {
        Some(sleep) => sleep.as_mut().poll(cx).is_ready(),
        None => false,
    }
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{op} deadline exceeded"))
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if expired(&mut this.read_deadline, cx) {
            return Poll::Ready(Err(timed_out("read")));
        }
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        this.read_waker = poll.is_pending().then(|| cx.waker().clone());
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if expired(&mut this.write_deadline, cx) {
            return Poll::Ready(Err(timed_out("write")));
        }
        let poll = Pin::new(&mut this.inner).poll_write(cx, data);
        this.write_waker = poll.is_pending().then(|| cx.waker().clone());
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if expired(&mut this.write_deadline, cx) {
            return Poll::Ready(Err(timed_out("write")));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
