//! Per-connection task: wait for the request, route it, run the session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::http::codec::RequestDecoder;
use crate::link::{CloseMode, Connector, FlowLink, Link, LinkOptions, OriginConnector};
use crate::net::connection::SessionId;
use crate::observability::metrics;
use crate::relay::error::Outcome;
use crate::relay::event::{RelayEvent, Side};
use crate::relay::policy;
use crate::relay::session::RelaySession;
use crate::routing::Router;
use crate::signing::{QueryPresigner, RequestSigner};

/// Everything a session needs from one configuration generation.
pub struct RelayContext<K: Connector = OriginConnector> {
    pub config: Arc<RelayConfig>,
    pub router: Router,
    pub signer: Arc<dyn RequestSigner>,
    pub connector: Arc<K>,
}

impl RelayContext<OriginConnector> {
    pub fn from_config(config: RelayConfig) -> Self {
        let signer = Arc::new(QueryPresigner::from_config(&config.origin));
        let connector = Arc::new(OriginConnector::from_config(&config));
        Self::new(config, signer, connector)
    }
}

impl<K: Connector> RelayContext<K> {
    pub fn new(config: RelayConfig, signer: Arc<dyn RequestSigner>, connector: Arc<K>) -> Self {
        Self {
            router: Router::from_config(&config.routes),
            config: Arc::new(config),
            signer,
            connector,
        }
    }

    fn link_options(&self) -> LinkOptions {
        self.config.limits.link_options()
    }
}

/// Serve one client connection to completion.
pub async fn serve_connection<S, K>(stream: S, peer: SocketAddr, id: SessionId, ctx: Arc<RelayContext<K>>) -> Outcome
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    K: Connector + 'static,
{
    let started = Instant::now();
    let limits = &ctx.config.limits;
    let (events, mut inbox) = mpsc::channel(limits.event_queue_depth);
    let client = FlowLink::spawn(
        stream,
        Side::Client,
        RequestDecoder::new(limits.max_request_head_bytes),
        events.clone(),
        ctx.link_options(),
    );

    let head = loop {
        match inbox.recv().await {
            Some(RelayEvent::RequestHead(head)) => break head,
            Some(RelayEvent::WritabilityChanged(..)) => continue,
            Some(RelayEvent::Error(Side::Client, e)) if e.is_framing() => {
                tracing::info!(session_id = %id, peer = %peer, error = %e, "Unreadable request");
                return finish_early(&client, StatusCode::BAD_REQUEST, Outcome::BadRequest, started);
            }
            other => {
                tracing::debug!(
                    session_id = %id,
                    peer = %peer,
                    event = other.as_ref().map(RelayEvent::kind).unwrap_or("none"),
                    "Client left before sending a request"
                );
                client.close(CloseMode::Immediate);
                metrics::record_session(Outcome::ClientAborted, started.elapsed(), 0);
                return Outcome::ClientAborted;
            }
        }
    };

    let Some(route) = ctx.router.resolve(head.path()) else {
        tracing::info!(session_id = %id, peer = %peer, target = %head.target, "No route matched");
        return finish_early(&client, StatusCode::NOT_FOUND, Outcome::NotFound, started);
    };

    let mut session = RelaySession::new(id, client, route, Arc::clone(&ctx.signer), Arc::clone(&ctx.connector), events);
    session.handle(RelayEvent::RequestHead(head));
    drive(session, inbox).await
}

fn finish_early<L: Link>(client: &L, status: StatusCode, outcome: Outcome, started: Instant) -> Outcome {
    policy::reject(client, status);
    client.close(CloseMode::Graceful);
    metrics::record_session(outcome, started.elapsed(), 0);
    outcome
}

/// Feed events into `session` until it closes.
///
/// Finished writes take priority over new input so a failed write is seen
/// before the next chunk is forwarded.
pub async fn drive<C, K>(mut session: RelaySession<C, K>, mut inbox: mpsc::Receiver<RelayEvent>) -> Outcome
where
    C: Link,
    K: Connector,
{
    while !session.is_closed() {
        let event = tokio::select! {
            biased;
            Some(event) = session.next_completion() => event,
            event = inbox.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        session.handle(event);
    }

    if !session.is_closed() {
        session.close();
    }
    session.outcome().unwrap_or(Outcome::ClientAborted)
}
