//! In-memory links for driving a session without sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::link::{link_closed, CloseMode, Connector, Link, WriteFuture};
use crate::relay::event::RelayEvent;

#[derive(Debug, Default)]
pub struct MockState {
    pub writes: Vec<Bytes>,
    pub writable: bool,
    pub readable: bool,
    /// Every `set_readable` call, in order.
    pub readable_calls: Vec<bool>,
    pub closes: Vec<CloseMode>,
    pub fail_writes: bool,
    /// Total written bytes at which the link turns unwritable.
    pub saturate_at: Option<usize>,
}

/// A link that records writes and always completes them at once.
#[derive(Debug, Clone)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                writable: true,
                readable: true,
                ..MockState::default()
            })),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_writable(&self, writable: bool) {
        self.state().writable = writable;
    }

    pub fn saturate_at(&self, bytes: usize) {
        self.state().saturate_at = Some(bytes);
    }

    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }

    /// Everything written so far, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state().writes.iter().flat_map(|b| b.iter().copied()).collect()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }
}

impl Link for MockLink {
    fn write(&self, data: Bytes) -> WriteFuture {
        let mut state = self.state();
        if state.fail_writes || !state.closes.is_empty() {
            return WriteFuture::ready(Err(link_closed()));
        }
        state.writes.push(data);
        if let Some(limit) = state.saturate_at {
            let total: usize = state.writes.iter().map(Bytes::len).sum();
            if total >= limit {
                state.writable = false;
            }
        }
        WriteFuture::ready(Ok(()))
    }

    fn is_writable(&self) -> bool {
        self.state().writable
    }

    fn set_readable(&self, readable: bool) {
        let mut state = self.state();
        state.readable = readable;
        state.readable_calls.push(readable);
    }

    fn close(&self, mode: CloseMode) {
        self.state().closes.push(mode);
    }

    fn is_closed(&self) -> bool {
        !self.state().closes.is_empty()
    }
}

/// Hands out one shared `MockLink` and counts connect attempts.
#[derive(Debug)]
pub struct MockConnector {
    pub link: MockLink,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            link: MockLink::new(),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Link = MockLink;

    fn connect(&self, _events: mpsc::Sender<RelayEvent>) -> MockLink {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.link.clone()
    }
}
