//! Tokio implementation of [`Link`] over any async byte stream.
//!
//! # Responsibilities
//! - Split the stream into a reader task and a writer task
//! - Count queued-but-unflushed bytes against the watermarks
//! - Gate event delivery on the readable flag (backpressure)
//! - Close gracefully (flush, then shutdown) or immediately
//!
//! # Design Decisions
//! - The readable flag is a `watch` channel; the reader re-checks it after
//!   reserving an inbox slot so a paused link never hands over more data
//! - Peer close and decode errors bypass the gate: they carry no payload
//! - Write accounting sits behind one mutex so a drain and a saturating
//!   write can never miss each other

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;

use crate::http::codec::CodecError;
use crate::link::{link_closed, CloseMode, Link, LinkOptions, WriteFuture};
use crate::relay::event::{RelayEvent, Side};

enum WriteOp {
    Data(Bytes, oneshot::Sender<io::Result<()>>),
    Shutdown,
}

#[derive(Debug)]
struct WriteBudget {
    queued: usize,
    writable: bool,
}

#[derive(Debug)]
struct Shared {
    budget: Mutex<WriteBudget>,
    closing: AtomicBool,
    kill: CancellationToken,
}

impl Shared {
    fn budget(&self) -> MutexGuard<'_, WriteBudget> {
        self.budget.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A flow-controlled connection driven by two background tasks.
pub struct FlowLink {
    side: Side,
    options: LinkOptions,
    shared: Arc<Shared>,
    ops: mpsc::UnboundedSender<WriteOp>,
    readable: watch::Sender<bool>,
}

/// The task-side halves of a link, consumed once the stream exists.
struct LinkTasks {
    side: Side,
    options: LinkOptions,
    shared: Arc<Shared>,
    ops: mpsc::UnboundedReceiver<WriteOp>,
    readable: watch::Receiver<bool>,
}

impl FlowLink {
    fn detached(side: Side, options: LinkOptions) -> (Self, LinkTasks) {
        let shared = Arc::new(Shared {
            budget: Mutex::new(WriteBudget {
                queued: 0,
                writable: true,
            }),
            closing: AtomicBool::new(false),
            kill: CancellationToken::new(),
        });
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (readable_tx, readable_rx) = watch::channel(true);

        let link = Self {
            side,
            options,
            shared: Arc::clone(&shared),
            ops: ops_tx,
            readable: readable_tx,
        };
        let tasks = LinkTasks {
            side,
            options,
            shared,
            ops: ops_rx,
            readable: readable_rx,
        };
        (link, tasks)
    }

    /// Wrap an established stream, e.g. an accepted client connection.
    pub fn spawn<S, D>(
        stream: S,
        side: Side,
        decoder: D,
        events: mpsc::Sender<RelayEvent>,
        options: LinkOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        D: Decoder<Item = RelayEvent, Error = CodecError> + Send + 'static,
    {
        let (link, tasks) = Self::detached(side, options);
        tasks.start(stream, decoder, events);
        link
    }

    /// Start a TCP connect in the background and return the link at once.
    ///
    /// Emits `Connected(side)` before any decoded event, or
    /// `ConnectFailed(side, err)`. Writes issued before the connect
    /// completes are queued.
    pub fn connect<D>(
        host: String,
        port: u16,
        side: Side,
        decoder: D,
        events: mpsc::Sender<RelayEvent>,
        options: LinkOptions,
    ) -> Self
    where
        D: Decoder<Item = RelayEvent, Error = CodecError> + Send + 'static,
    {
        let (link, tasks) = Self::detached(side, options);
        tokio::spawn(async move {
            let kill = tasks.shared.kill.clone();
            let result = tokio::select! {
                _ = kill.cancelled() => return,
                result = TcpStream::connect((host.as_str(), port)) => result,
            };
            match result {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(side = %side, host = %host, port, "Link connected");
                    if events.send(RelayEvent::Connected(side)).await.is_err() {
                        kill.cancel();
                        return;
                    }
                    tasks.start(stream, decoder, events);
                }
                Err(e) => {
                    tracing::debug!(side = %side, host = %host, port, error = %e, "Link connect failed");
                    kill.cancel();
                    let _ = events.send(RelayEvent::ConnectFailed(side, e)).await;
                }
            }
        });
        link
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Bytes queued but not yet flushed.
    pub fn queued_bytes(&self) -> usize {
        self.shared.budget().queued
    }
}

impl Link for FlowLink {
    fn write(&self, data: Bytes) -> WriteFuture {
        if self.is_closed() {
            return WriteFuture::ready(Err(link_closed()));
        }

        {
            let mut budget = self.shared.budget();
            budget.queued += data.len();
            if budget.writable && budget.queued >= self.options.high_watermark {
                budget.writable = false;
                tracing::trace!(side = %self.side, queued = budget.queued, "Link saturated");
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self.ops.send(WriteOp::Data(data, done_tx)).is_err() {
            return WriteFuture::ready(Err(link_closed()));
        }
        WriteFuture::pending(done_rx)
    }

    fn is_writable(&self) -> bool {
        self.shared.budget().writable
    }

    fn set_readable(&self, readable: bool) {
        let previous = self.readable.send_replace(readable);
        if previous != readable {
            tracing::trace!(side = %self.side, readable, "Link read interest changed");
        }
    }

    fn close(&self, mode: CloseMode) {
        match mode {
            CloseMode::Graceful => {
                if !self.shared.closing.swap(true, Ordering::SeqCst) {
                    let _ = self.ops.send(WriteOp::Shutdown);
                }
            }
            CloseMode::Immediate => {
                self.shared.closing.store(true, Ordering::SeqCst);
                self.shared.kill.cancel();
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst) || self.shared.kill.is_cancelled()
    }
}

impl std::fmt::Debug for FlowLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowLink")
            .field("side", &self.side)
            .field("writable", &self.is_writable())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LinkTasks {
    fn start<S, D>(self, stream: S, decoder: D, events: mpsc::Sender<RelayEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        D: Decoder<Item = RelayEvent, Error = CodecError> + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);

        tokio::spawn(read_loop(
            reader,
            decoder,
            self.side,
            self.options,
            Arc::clone(&self.shared),
            self.readable,
            events.clone(),
        ));
        tokio::spawn(write_loop(
            writer,
            self.ops,
            self.side,
            self.options,
            self.shared,
            events,
        ));
    }
}

async fn read_loop<R, D>(
    reader: R,
    decoder: D,
    side: Side,
    options: LinkOptions,
    shared: Arc<Shared>,
    mut readable: watch::Receiver<bool>,
    events: mpsc::Sender<RelayEvent>,
) where
    R: AsyncRead + Unpin,
    D: Decoder<Item = RelayEvent, Error = CodecError>,
{
    let kill = shared.kill.clone();
    let mut frames = FramedRead::with_capacity(reader, decoder, options.read_buffer_size);

    loop {
        if !wait_readable(&kill, &mut readable).await {
            return;
        }

        let next = tokio::select! {
            _ = kill.cancelled() => return,
            next = frames.next() => next,
        };

        let (event, terminal) = match next {
            Some(Ok(event)) => (event, false),
            Some(Err(e)) => {
                tracing::debug!(side = %side, error = %e, "Link decode failed");
                (RelayEvent::Error(side, e), true)
            }
            None => (RelayEvent::Closed(side), true),
        };

        if !deliver(&kill, &mut readable, &events, event, !terminal).await || terminal {
            return;
        }
    }
}

/// Wait until the link is readable. Returns false once the link is gone.
async fn wait_readable(kill: &CancellationToken, readable: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = kill.cancelled() => false,
        ready = async { readable.wait_for(|r| *r).await.is_ok() } => ready,
    }
}

/// Hand one event to the session. Gated events wait while the link is paused.
async fn deliver(
    kill: &CancellationToken,
    readable: &mut watch::Receiver<bool>,
    events: &mpsc::Sender<RelayEvent>,
    event: RelayEvent,
    gated: bool,
) -> bool {
    loop {
        let permit = tokio::select! {
            _ = kill.cancelled() => return false,
            permit = events.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        let ready = !gated || *readable.borrow();
        if ready {
            permit.send(event);
            return true;
        }
        drop(permit);

        if !wait_readable(kill, readable).await {
            return false;
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut ops: mpsc::UnboundedReceiver<WriteOp>,
    side: Side,
    options: LinkOptions,
    shared: Arc<Shared>,
    events: mpsc::Sender<RelayEvent>,
) where
    W: AsyncWrite + Unpin,
{
    let kill = shared.kill.clone();

    loop {
        let op = tokio::select! {
            biased;
            _ = kill.cancelled() => break,
            op = ops.recv() => op,
        };

        match op {
            Some(WriteOp::Data(data, done)) => {
                let len = data.len();
                let result = tokio::select! {
                    _ = kill.cancelled() => break,
                    result = write_flush(&mut writer, &data) => result,
                };

                let drained = {
                    let mut budget = shared.budget();
                    budget.queued = budget.queued.saturating_sub(len);
                    if !budget.writable && budget.queued <= options.low_watermark {
                        budget.writable = true;
                        true
                    } else {
                        false
                    }
                };

                match result {
                    Ok(()) => {
                        let _ = done.send(Ok(()));
                        if drained {
                            tracing::trace!(side = %side, "Link drained");
                            let _ = events.send(RelayEvent::WritabilityChanged(side, true)).await;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(side = %side, error = %e, "Link write failed");
                        let _ = done.send(Err(e));
                        break;
                    }
                }
            }
            Some(WriteOp::Shutdown) | None => {
                tokio::select! {
                    _ = kill.cancelled() => {}
                    _ = writer.shutdown() => {}
                }
                break;
            }
        }
    }

    // Stops the reader as well; a closed link delivers nothing more.
    kill.cancel();
}

async fn write_flush<W>(writer: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(data).await?;
    writer.flush().await
}
