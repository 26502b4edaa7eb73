//! Flow-controlled links.
//!
//! # Data Flow
//! ```text
//! socket read half
//!     → flow.rs reader task (paused while set_readable(false))
//!     → codec (request or response decoder)
//!     → RelayEvent into the session inbox
//!
//! session write(bytes)
//!     → flow.rs write queue (counts unflushed bytes)
//!     → writer task → socket write half
//!     → WriteFuture resolves; WritabilityChanged once drained
//! ```
//!
//! # Design Decisions
//! - One abstraction for both legs: the client link and the origin link only
//!   differ in the decoder they run
//! - Writes never block the caller; saturation is reported through
//!   `is_writable()` using a high/low watermark pair
//! - Closing is idempotent; graceful close flushes queued writes first

pub mod connector;
pub mod flow;
#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::relay::event::RelayEvent;

pub use connector::OriginConnector;
pub use flow::FlowLink;

/// How a link should be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Flush queued writes, then shut the connection down.
    Graceful,
    /// Drop the connection now, discarding queued writes.
    Immediate,
}

/// A network connection with explicit flow control.
pub trait Link: Send {
    /// Queue `data` for writing. The returned future resolves once the bytes
    /// reached the socket, or with the error that prevented it.
    fn write(&self, data: Bytes) -> WriteFuture;

    /// False while the queue of unflushed bytes is saturated.
    fn is_writable(&self) -> bool;

    /// Pause (`false`) or resume (`true`) delivery of incoming data.
    fn set_readable(&self, readable: bool);

    /// Close the link. Calling this again is a no-op, except that an
    /// `Immediate` close still aborts a graceful close in progress.
    fn close(&self, mode: CloseMode);

    /// True once `close` was called or the connection failed.
    fn is_closed(&self) -> bool;
}

/// Creates origin links for sessions.
pub trait Connector: Send + Sync {
    type Link: Link + 'static;

    /// Start connecting. The link is usable immediately; it reports
    /// `Connected` or `ConnectFailed` through `events`.
    fn connect(&self, events: mpsc::Sender<RelayEvent>) -> Self::Link;
}

/// Buffering and watermark settings shared by both legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Unflushed bytes at which the link stops being writable.
    pub high_watermark: usize,
    /// Unflushed bytes at which a saturated link becomes writable again.
    pub low_watermark: usize,
    /// Initial capacity of the read buffer.
    pub read_buffer_size: usize,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            high_watermark: 64 * 1024,
            low_watermark: 32 * 1024,
            read_buffer_size: 8 * 1024,
        }
    }
}

/// Completion of a [`Link::write`].
#[derive(Debug)]
pub struct WriteFuture {
    inner: WriteState,
}

#[derive(Debug)]
enum WriteState {
    Ready(Option<io::Result<()>>),
    Pending(oneshot::Receiver<io::Result<()>>),
}

impl WriteFuture {
    /// A write that has already completed.
    pub fn ready(result: io::Result<()>) -> Self {
        Self {
            inner: WriteState::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<io::Result<()>>) -> Self {
        Self {
            inner: WriteState::Pending(rx),
        }
    }
}

impl Future for WriteFuture {
    type Output = io::Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            WriteState::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| Err(link_closed()))),
            WriteState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or_else(|_| Err(link_closed()))),
        }
    }
}

/// Error reported for writes on a link that is gone.
pub(crate) fn link_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "link closed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_write_future_resolves() {
        assert!(WriteFuture::ready(Ok(())).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_sender_resolves_as_broken_pipe() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let err = WriteFuture::pending(rx).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
