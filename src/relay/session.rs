//! Per-request relay state machine.
//!
//! # Responsibilities
//! - Validate the client request (path, method, object key)
//! - Open the origin link and send the signed request
//! - Translate the origin response and stream it to the client
//! - Pause and resume the origin as the client drains
//! - Tear both links down exactly once
//!
//! # Data Flow
//! ```text
//! Idle ──RequestHead──▶ Connecting ──Connected──▶ Connected ──RequestSent──▶ Relaying
//!  │                        │                         │                        │
//!  └── 403/404/405 ──┐      └── ConnectFailed ──┐     └── write failure ──┐    └── last chunk / failure
//!                    ▼                          ▼                         ▼         ▼
//!                                          Closed (terminal)
//! ```
//!
//! # Design Decisions
//! - Sans-IO: `handle` is synchronous; all I/O sits behind the `Link` trait,
//!   so the whole machine is tested with in-memory links
//! - Write completions are futures owned by the session and fed back in as
//!   events by the driver, never awaited inline
//! - A response head arriving while the request write is still in flight
//!   counts as a successful send

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use hyper::{Method, StatusCode};
use tokio::sync::mpsc;

use crate::http::request::{encode_origin_request, RequestHead};
use crate::http::response::{error_response, translate_head, BodyFraming, ResponseHead, Translation};
use crate::link::{CloseMode, Connector, Link};
use crate::net::connection::SessionId;
use crate::observability::metrics;
use crate::relay::error::{Outcome, RelayError};
use crate::relay::event::{BodyChunk, RelayEvent, Side};
use crate::relay::policy;
use crate::routing::{object_key, sanitize_path, Route};
use crate::signing::{RequestSigner, SignedRequest};

/// Where a session is in its single round trip. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Relaying,
    Closed,
}

pub struct RelaySession<C: Link, K: Connector> {
    id: SessionId,
    state: SessionState,
    history: Vec<SessionState>,
    inbound: C,
    outbound: Option<K::Link>,
    route_name: String,
    bucket: String,
    object_key: Option<String>,
    /// Kept for logging until the response starts relaying.
    pending_request: Option<RequestHead>,
    signed: Option<SignedRequest>,
    signer: Arc<dyn RequestSigner>,
    connector: Arc<K>,
    events: mpsc::Sender<RelayEvent>,
    framing: BodyFraming,
    response_started: bool,
    origin_paused: bool,
    completions: FuturesUnordered<BoxFuture<'static, RelayEvent>>,
    bytes_relayed: u64,
    started: Instant,
    outcome: Option<Outcome>,
}

impl<C: Link, K: Connector> RelaySession<C, K> {
    pub fn new(
        id: SessionId,
        inbound: C,
        route: &Route,
        signer: Arc<dyn RequestSigner>,
        connector: Arc<K>,
        events: mpsc::Sender<RelayEvent>,
    ) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            inbound,
            outbound: None,
            route_name: route.name.clone(),
            bucket: route.bucket.clone(),
            object_key: None,
            pending_request: None,
            signed: None,
            signer,
            connector,
            events,
            framing: BodyFraming::Identity,
            response_started: false,
            origin_paused: false,
            completions: FuturesUnordered::new(),
            bytes_relayed: 0,
            started: Instant::now(),
            outcome: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Set once the session is closed.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn object_key(&self) -> Option<&str> {
        self.object_key.as_deref()
    }

    pub fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed
    }

    /// The next finished write, as an event. `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<RelayEvent> {
        self.completions.next().await
    }

    pub fn handle(&mut self, event: RelayEvent) {
        if self.state == SessionState::Closed {
            tracing::trace!(session_id = %self.id, event = event.kind(), "Event after close ignored");
            return;
        }

        match event {
            RelayEvent::RequestHead(head) => self.on_request(head),
            RelayEvent::Connected(Side::Origin) => self.on_connected(),
            RelayEvent::ConnectFailed(Side::Origin, e) => self.fail(RelayError::Connect(e)),
            RelayEvent::RequestSent(Ok(())) => self.on_request_sent(),
            RelayEvent::RequestSent(Err(e)) => self.fail(RelayError::OriginWrite(e)),
            RelayEvent::ResponseHead(head) => self.on_response_head(head),
            RelayEvent::BodyChunk(chunk) => self.on_body_chunk(chunk),
            RelayEvent::WriteCompleted(_) => {}
            RelayEvent::WriteFailed(Side::Client, e) => self.fail(RelayError::ClientWrite(e)),
            RelayEvent::WriteFailed(Side::Origin, e) => self.fail(RelayError::OriginWrite(e)),
            RelayEvent::WritabilityChanged(Side::Client, true) => self.resume_origin(),
            RelayEvent::WritabilityChanged(..) => {}
            RelayEvent::Error(side, e) => self.fail(RelayError::protocol(side, e)),
            RelayEvent::Closed(Side::Client) => self.fail(RelayError::ClientClosed),
            RelayEvent::Closed(Side::Origin) => self.fail(RelayError::OriginClosed),
            RelayEvent::Connected(Side::Client) | RelayEvent::ConnectFailed(Side::Client, _) => {
                tracing::warn!(session_id = %self.id, "Unexpected client connect event");
            }
        }
    }

    /// Close the session from outside, e.g. on shutdown. No-op once closed.
    pub fn close(&mut self) {
        self.teardown(CloseMode::Graceful, Outcome::ClientAborted);
    }

    fn transition(&mut self, next: SessionState) {
        if next <= self.state {
            tracing::warn!(session_id = %self.id, from = ?self.state, to = ?next, "Backward transition refused");
            return;
        }
        tracing::debug!(session_id = %self.id, from = ?self.state, to = ?next, "Session state changed");
        self.state = next;
        self.history.push(next);
    }

    fn on_request(&mut self, head: RequestHead) {
        if self.state != SessionState::Idle {
            tracing::debug!(session_id = %self.id, "Extra request head ignored");
            return;
        }

        tracing::info!(
            session_id = %self.id,
            method = %head.method,
            target = %head.target,
            protocol = head.protocol(),
            host = head.host().unwrap_or(""),
            user_agent = head.user_agent().unwrap_or(""),
            route = %self.route_name,
            "Request received"
        );

        let path = match sanitize_path(&head.target) {
            Ok(path) => path,
            Err(e) => {
                tracing::info!(session_id = %self.id, target = %head.target, error = %e, "Path rejected");
                self.respond_and_close(StatusCode::FORBIDDEN, Outcome::Forbidden);
                return;
            }
        };

        if head.method != Method::GET {
            self.respond_and_close(StatusCode::METHOD_NOT_ALLOWED, Outcome::MethodNotAllowed);
            return;
        }

        let key = object_key(&path);
        if key.is_empty() {
            self.respond_and_close(StatusCode::NOT_FOUND, Outcome::NotFound);
            return;
        }
        let key = key.to_string();
        self.pending_request = Some(head);

        match self.signer.sign(&self.bucket, &key) {
            Ok(signed) => self.signed = Some(signed),
            Err(e) => {
                self.object_key = Some(key);
                self.fail(e.into());
                return;
            }
        }
        self.object_key = Some(key);

        self.transition(SessionState::Connecting);
        self.outbound = Some(self.connector.connect(self.events.clone()));
    }

    fn on_connected(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.transition(SessionState::Connected);

        let (Some(origin), Some(signed)) = (self.outbound.as_ref(), self.signed.take()) else {
            return;
        };
        let write = origin.write(encode_origin_request(&signed));
        self.completions
            .push(Box::pin(async move { RelayEvent::RequestSent(write.await) }));
    }

    fn on_request_sent(&mut self) {
        if self.state == SessionState::Connected {
            self.start_relaying();
        }
    }

    fn start_relaying(&mut self) {
        self.pending_request = None;
        self.transition(SessionState::Relaying);
    }

    fn on_response_head(&mut self, head: ResponseHead) {
        if self.state == SessionState::Connected {
            self.start_relaying();
        }
        if self.state != SessionState::Relaying || self.response_started {
            tracing::debug!(session_id = %self.id, state = ?self.state, "Response head ignored");
            return;
        }

        tracing::debug!(session_id = %self.id, status = %head.status, "Origin responded");

        match translate_head(&head) {
            Translation::Error(status) => {
                let outcome = if status == StatusCode::NOT_FOUND {
                    Outcome::NotFound
                } else {
                    tracing::warn!(
                        session_id = %self.id,
                        origin_status = %head.status,
                        "Origin error mapped to {}",
                        status.as_u16()
                    );
                    Outcome::UpstreamError
                };
                self.respond_and_close(status, outcome);
            }
            Translation::Stream { head, framing } => {
                if !self.inbound.is_writable() {
                    self.fail(RelayError::ClientSaturated);
                    return;
                }
                self.framing = framing;
                self.response_started = true;
                self.write_client(head);
                self.apply_backpressure();
            }
        }
    }

    /// Forward one body fragment.
    ///
    /// The origin is paused as soon as a write saturates the client, and only
    /// resumed while the client is writable. Fragments arriving while paused
    /// were decoded before the pause and are still forwarded. Writability
    /// only drops on our own writes, so a saturated client is caught when the
    /// response head arrives; the abort here only fires for a link that went
    /// unwritable without a write from this session.
    fn on_body_chunk(&mut self, chunk: BodyChunk) {
        if self.state != SessionState::Relaying || !self.response_started {
            tracing::trace!(session_id = %self.id, "Body chunk outside relaying ignored");
            return;
        }

        if !self.inbound.is_writable() && !self.origin_paused {
            self.fail(RelayError::ClientSaturated);
            return;
        }

        self.bytes_relayed += chunk.data.len() as u64;
        if let Some(bytes) = self.framing.encode(&chunk) {
            self.write_client(bytes);
        }

        if chunk.last {
            tracing::debug!(session_id = %self.id, bytes = self.bytes_relayed, "Body complete");
            self.teardown(CloseMode::Graceful, Outcome::Relayed);
            return;
        }
        self.apply_backpressure();
    }

    fn write_client(&mut self, bytes: bytes::Bytes) {
        let write = self.inbound.write(bytes);
        self.completions.push(Box::pin(async move {
            match write.await {
                Ok(()) => RelayEvent::WriteCompleted(Side::Client),
                Err(e) => RelayEvent::WriteFailed(Side::Client, e),
            }
        }));
    }

    fn apply_backpressure(&mut self) {
        if self.origin_paused || self.inbound.is_writable() {
            return;
        }
        if let Some(origin) = &self.outbound {
            origin.set_readable(false);
            self.origin_paused = true;
            metrics::record_backpressure_pause();
            tracing::trace!(session_id = %self.id, "Origin paused");
        }
    }

    /// Resume reading from the origin after the client drained.
    ///
    /// A drain notice can be stale: a chunk decoded before the pause may have
    /// saturated the client again since. The origin then stays paused until
    /// the next drain.
    fn resume_origin(&mut self) {
        if !self.origin_paused || self.state != SessionState::Relaying {
            return;
        }
        if !self.inbound.is_writable() {
            tracing::trace!(session_id = %self.id, "Stale drain notice, origin stays paused");
            return;
        }
        if let Some(origin) = &self.outbound {
            origin.set_readable(true);
            tracing::trace!(session_id = %self.id, "Origin resumed");
        }
        self.origin_paused = false;
    }

    /// Answer with an error page and close gracefully so it flushes.
    fn respond_and_close(&mut self, status: StatusCode, outcome: Outcome) {
        if !self.response_started && !self.inbound.is_closed() {
            drop(self.inbound.write(error_response(status)));
        }
        self.teardown(CloseMode::Graceful, outcome);
    }

    fn fail(&mut self, err: RelayError) {
        match err.side() {
            Side::Client => tracing::debug!(
                session_id = %self.id,
                state = ?self.state,
                error = %err,
                "Client leg failed"
            ),
            Side::Origin => tracing::warn!(
                session_id = %self.id,
                state = ?self.state,
                key = self.object_key.as_deref().unwrap_or(""),
                target = self.pending_request.as_ref().map(|h| h.target.as_str()).unwrap_or(""),
                error = %err,
                "Origin leg failed"
            ),
        }

        if let Some(status) = policy::error_page(&err, self.response_started) {
            policy::reject(&self.inbound, status);
        }
        self.teardown(policy::client_close_mode(&err), err.outcome());
    }

    fn teardown(&mut self, client_mode: CloseMode, outcome: Outcome) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(origin) = self.outbound.take() {
            origin.close(CloseMode::Immediate);
        }
        self.inbound.close(client_mode);
        self.pending_request = None;
        self.signed = None;
        self.transition(SessionState::Closed);
        self.outcome = Some(outcome);

        let elapsed = self.started.elapsed();
        metrics::record_session(outcome, elapsed, self.bytes_relayed);
        tracing::info!(
            session_id = %self.id,
            outcome = %outcome,
            key = self.object_key.as_deref().unwrap_or(""),
            bytes = self.bytes_relayed,
            duration_ms = elapsed.as_millis() as u64,
            "Session closed"
        );
    }
}
