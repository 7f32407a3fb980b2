//! Asynchronous in-memory byte pipes.
//!
//! A pipe is a `u8` channel whose ends implement [`AsyncRead`] and [`AsyncWrite`], useful for streaming raw bus
//! traffic from a reader task into a decoder without allocating per chunk.
use crate::builder::OverflowPolicy;
use crate::channel::{self, Receiver, Sender};
use crate::error::Error;
use crate::spsc;
use futures_io::{AsyncRead, AsyncWrite};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

const DEFAULT_CAPACITY: usize = 8192;

/// Open a new pipe with a buffer of 8 KiB.
pub fn pipe() -> (PipeReader, PipeWriter) {
    let (producer, consumer) = spsc::with_capacity(DEFAULT_CAPACITY);
    let (writer, reader) = channel::from_halves(producer, consumer, OverflowPolicy::Reject);
    (PipeReader { inner: reader }, PipeWriter { inner: writer })
}

/// Open a new pipe with a buffer of the given capacity, rounded up to the next power of two.
pub fn pipe_with_capacity(capacity: usize) -> Result<(PipeReader, PipeWriter), Error> {
    let (writer, reader) = channel::bounded(capacity)?;
    Ok((PipeReader { inner: reader }, PipeWriter { inner: writer }))
}

/// The reading end of a pipe.
#[derive(Debug)]
pub struct PipeReader {
    inner: Receiver<u8>,
}

impl AsyncRead for PipeReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        // An empty destination reads nothing; it must not be mistaken for EOF by waiting on it.
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        self.inner.poll_recv_slice(cx, buf).map(Ok)
    }
}

/// The writing end of a pipe.
#[derive(Debug)]
pub struct PipeWriter {
    inner: Sender<u8>,
}

impl PipeWriter {
    /// Check if the reading end of the pipe has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.inner
            .poll_send_slice(cx, buf)
            .map_err(|_| io::ErrorKind::BrokenPipe.into())
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.close();
        Poll::Ready(Ok(()))
    }
}
