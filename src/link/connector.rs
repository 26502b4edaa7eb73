//! Origin link factory.

use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::http::codec::ResponseDecoder;
use crate::link::{Connector, FlowLink, LinkOptions};
use crate::relay::event::{RelayEvent, Side};

/// Opens a fresh TCP link to the configured origin for every session.
#[derive(Debug, Clone)]
pub struct OriginConnector {
    host: String,
    port: u16,
    options: LinkOptions,
    max_response_head: usize,
}

impl OriginConnector {
    pub fn new(host: impl Into<String>, port: u16, options: LinkOptions, max_response_head: usize) -> Self {
        Self {
            host: host.into(),
            port,
            options,
            max_response_head,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.origin.host.clone(),
            config.origin.port,
            config.limits.link_options(),
            config.limits.max_response_head_bytes,
        )
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Connector for OriginConnector {
    type Link = FlowLink;

    fn connect(&self, events: mpsc::Sender<RelayEvent>) -> FlowLink {
        tracing::debug!(origin = %self.address(), "Opening origin link");
        FlowLink::connect(
            self.host.clone(),
            self.port,
            Side::Origin,
            ResponseDecoder::new(self.max_response_head),
            events,
            self.options,
        )
    }
}
