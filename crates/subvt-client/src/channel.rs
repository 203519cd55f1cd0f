//! The transport seam consumed by the engine.
//!
//! A [`Channel`] is an ordered, bidirectional connection to one endpoint,
//! represented as a pair of queues: text frames going out, [`ChannelEvent`]s
//! coming in. Transports ([`crate::WsConnector`], [`memory::MemoryConnector`])
//! pump these queues from whatever carries the frames.

pub mod memory;

use std::future::Future;
use subvt_core::{ClientMessage, Endpoint};
use tokio::sync::mpsc;

/// Something that happened on the inbound side of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One text frame, in delivery order.
    Frame(String),
    /// The channel closed; no more events follow.
    Closed(String),
}

/// Error raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("channel closed")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Opens channels to endpoints.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Channel, ChannelError>> + Send;
}

/// An open channel.
#[derive(Debug)]
pub struct Channel {
    outbound: Outbound,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Channel {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self {
            outbound: Outbound(outbound),
            inbound,
        }
    }

    /// Create a channel connected to an in-process [`memory::RemoteEnd`].
    pub fn pair() -> (Self, memory::RemoteEnd) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self::new(outbound_tx, inbound_rx),
            memory::RemoteEnd::new(outbound_rx, inbound_tx),
        )
    }

    pub(crate) fn into_parts(self) -> (Outbound, mpsc::UnboundedReceiver<ChannelEvent>) {
        (self.outbound, self.inbound)
    }
}

/// Sending half of a channel.
#[derive(Debug, Clone)]
pub(crate) struct Outbound(mpsc::UnboundedSender<String>);

impl Outbound {
    pub(crate) fn is_open(&self) -> bool {
        !self.0.is_closed()
    }

    pub(crate) fn send(&self, message: &ClientMessage) -> Result<(), ChannelError> {
        let text =
            serde_json::to_string(message).map_err(|err| ChannelError::Encode(err.to_string()))?;
        self.0.send(text).map_err(|_| ChannelError::Closed)
    }
}
