//! WebSocket transport.

use crate::channel::{Channel, ChannelError, ChannelEvent, Connector};
use futures_util::{SinkExt, StreamExt};
use subvt_core::Endpoint;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Opens WebSocket channels, over TLS when the endpoint asks for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Channel, ChannelError> {
        let url = endpoint.url();
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| ChannelError::Connect(err.to_string()))?;

        tracing::debug!(%endpoint, "websocket connected");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, outbound_rx, inbound_tx, endpoint.clone()));

        Ok(Channel::new(outbound_tx, inbound_rx))
    }
}

/// Moves frames between the socket and the channel queues until either side ends.
async fn pump(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<ChannelEvent>,
    endpoint: Endpoint,
) {
    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            // Outgoing frame from the engine
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    // Engine released the channel; queued frames were already flushed
                    let _ = sink.close().await;
                    tracing::debug!(%endpoint, "websocket released");
                    return;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    break format!("send failed: {e}");
                }
            }

            // Incoming frame from the backend
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if inbound.send(ChannelEvent::Frame(text.as_str().to_owned())).is_err() {
                            let _ = sink.close().await;
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| "closed by peer".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "connection reset".to_string(),
                }
            }
        }
    };

    tracing::debug!(%endpoint, %reason, "websocket closed");
    let _ = inbound.send(ChannelEvent::Closed(reason));
}
