//! In-process channels for tests and embedding.

use super::{Channel, ChannelError, ChannelEvent, Connector};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use subvt_core::{ClientMessage, Endpoint, ServerMessage};
use tokio::sync::mpsc;

/// The backend side of an in-process channel.
#[derive(Debug)]
pub struct RemoteEnd {
    sent: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl RemoteEnd {
    pub(super) fn new(
        sent: mpsc::UnboundedReceiver<String>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self { sent, events }
    }

    /// Next frame the client sent, or `None` once the client released the channel.
    pub async fn recv(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Next frame the client sent, decoded.
    ///
    /// Frames that are not valid client messages are skipped.
    pub async fn recv_message(&mut self) -> Option<ClientMessage> {
        while let Some(text) = self.sent.recv().await {
            if let Ok(message) = serde_json::from_str(&text) {
                return Some(message);
            }
        }
        None
    }

    /// Deliver a raw text frame to the client.
    pub fn send_frame(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        self.events
            .send(ChannelEvent::Frame(text.into()))
            .map_err(|_| ChannelError::Closed)
    }

    /// Deliver a server message to the client.
    pub fn send<S: Serialize, D: Serialize>(
        &self,
        message: &ServerMessage<S, D>,
    ) -> Result<(), ChannelError> {
        let text =
            serde_json::to_string(message).map_err(|err| ChannelError::Encode(err.to_string()))?;
        self.send_frame(text)
    }

    /// Close the channel from the backend side.
    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::Closed(reason.into()));
    }
}

/// A [`Connector`] handing every opened channel's backend side to a listener.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<(Endpoint, RemoteEnd)>,
    refuse: Arc<AtomicBool>,
}

/// Receives the backend side of every channel a [`MemoryConnector`] opens.
#[derive(Debug)]
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<(Endpoint, RemoteEnd)>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                accepted: tx,
                refuse: Arc::new(AtomicBool::new(false)),
            },
            MemoryListener { accepted: rx },
        )
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Channel, ChannelError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect(format!("{endpoint} refused")));
        }
        let (channel, remote) = Channel::pair();
        self.accepted
            .send((endpoint.clone(), remote))
            .map_err(|_| ChannelError::Connect(format!("{endpoint} has no listener")))?;
        Ok(channel)
    }
}

impl MemoryListener {
    /// Wait for the next opened channel.
    pub async fn accept(&mut self) -> Option<(Endpoint, RemoteEnd)> {
        self.accepted.recv().await
    }

    /// Channel already opened, without waiting.
    pub fn try_accept(&mut self) -> Option<(Endpoint, RemoteEnd)> {
        self.accepted.try_recv().ok()
    }
}
