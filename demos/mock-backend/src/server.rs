//! WebSocket server speaking the feed protocol.

use crate::chain::{Chain, Tick};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use subvt_core::{BlockMarkers, ClientMessage, ServerMessage, SubscriptionId};
use subvt_feeds::{AccountId, FeedKind, ValidatorListKind};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

type SharedChain = Arc<RwLock<Chain>>;
type Sink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// What a subscription follows.
#[derive(Debug, Clone)]
enum Topic {
    NetworkStatus,
    ValidatorList(ValidatorListKind),
    ValidatorDetails(AccountId),
}

impl Topic {
    fn parse(topic: &str, parameters: &[String]) -> Result<Self, (&'static str, String)> {
        let kind: FeedKind = topic
            .parse()
            .map_err(|e| ("unknown_topic", format!("{e}")))?;
        match (kind, parameters) {
            (FeedKind::NetworkStatus, []) => Ok(Topic::NetworkStatus),
            (FeedKind::ValidatorList, []) => Ok(Topic::ValidatorList(ValidatorListKind::Active)),
            (FeedKind::ValidatorList, [kind]) => kind
                .parse()
                .map(Topic::ValidatorList)
                .map_err(|e| ("invalid_parameters", format!("{e}"))),
            (FeedKind::ValidatorDetails, [account_id]) => {
                Ok(Topic::ValidatorDetails(AccountId::new(account_id.as_str())))
            }
            (kind, _) => Err((
                "invalid_parameters",
                format!("{kind} does not take {parameters:?}"),
            )),
        }
    }
}

struct Active {
    request_id: u64,
    topic: Topic,
    /// Best block of the last snapshot sent.
    synced_to: Option<u64>,
}

impl Active {
    /// Whether the last snapshot already includes `tick`.
    fn covers(&self, tick: &Tick) -> bool {
        tick.markers.best_block_number <= self.synced_to
    }
}

pub async fn run(addr: SocketAddr, tick: Duration, chain: Chain) -> anyhow::Result<()> {
    let chain = Arc::new(RwLock::new(chain));
    let (tick_tx, _) = broadcast::channel::<Arc<Tick>>(64);

    tokio::spawn(produce_blocks(chain.clone(), tick, tick_tx.clone()));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let chain = chain.clone();
        let ticks = tick_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, chain, ticks).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn produce_blocks(chain: SharedChain, period: Duration, ticks: broadcast::Sender<Arc<Tick>>) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let tick = chain.write().await.tick();
        tracing::debug!(
            best = ?tick.markers.best_block_number,
            finalized = ?tick.markers.finalized_block_number,
            "block"
        );
        // No receivers just means no client is connected.
        let _ = ticks.send(Arc::new(tick));
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    chain: SharedChain,
    mut ticks: broadcast::Receiver<Arc<Tick>>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    let mut subscriptions: HashMap<SubscriptionId, Active> = HashMap::new();
    let mut next_id = 1u64;

    tracing::debug!("New connection from {}", addr);

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let message: ClientMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!("Invalid message: {}", e);
                        continue;
                    }
                };

                match message {
                    ClientMessage::Subscribe { request_id, topic, parameters } => {
                        let topic = match Topic::parse(&topic, &parameters) {
                            Ok(topic) => topic,
                            Err((code, message)) => {
                                reject(&mut sink, request_id, code, message).await?;
                                continue;
                            }
                        };
                        let id = SubscriptionId(next_id);
                        next_id += 1;
                        if let Some(markers) = send_snapshot(&mut sink, &chain, request_id, id, &topic).await? {
                            tracing::info!(%addr, subscription_id = %id, ?topic, "subscribed");
                            subscriptions.insert(id, Active {
                                request_id,
                                topic,
                                synced_to: markers.best_block_number,
                            });
                        }
                    }
                    ClientMessage::Unsubscribe { subscription_id } => {
                        if subscriptions.remove(&subscription_id).is_some() {
                            tracing::info!(%addr, %subscription_id, "unsubscribed");
                            send(&mut sink, &ServerMessage::<(), ()>::Unsubscribed { subscription_id }).await?;
                        } else {
                            tracing::debug!(%addr, %subscription_id, "unsubscribe for unknown subscription");
                        }
                    }
                }
            }

            tick = ticks.recv() => match tick {
                Ok(tick) => {
                    for (id, active) in &subscriptions {
                        if active.covers(&tick) {
                            continue;
                        }
                        send_update(&mut sink, *id, &active.topic, &tick).await?;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%addr, skipped, "client lagging, resyncing");
                    for (id, active) in subscriptions.iter_mut() {
                        let resynced =
                            send_snapshot(&mut sink, &chain, active.request_id, *id, &active.topic).await?;
                        if let Some(markers) = resynced {
                            active.synced_to = markers.best_block_number;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::debug!("Connection closed: {}", addr);
    Ok(())
}

async fn send<S: Serialize, D: Serialize>(
    sink: &mut Sink,
    message: &ServerMessage<S, D>,
) -> anyhow::Result<()> {
    sink.send(Message::Text(serde_json::to_string(message)?.into()))
        .await?;
    Ok(())
}

async fn reject(
    sink: &mut Sink,
    request_id: u64,
    code: &str,
    message: String,
) -> anyhow::Result<()> {
    tracing::info!(request_id, code, %message, "rejecting subscribe");
    send(
        sink,
        &ServerMessage::<(), ()>::Error {
            request_id: Some(request_id),
            code: code.to_string(),
            message,
        },
    )
    .await
}

/// Send the current state for `topic` and return the markers it was taken at,
/// or `None` if the subscribe was rejected instead.
async fn send_snapshot(
    sink: &mut Sink,
    chain: &SharedChain,
    request_id: u64,
    subscription_id: SubscriptionId,
    topic: &Topic,
) -> anyhow::Result<Option<BlockMarkers>> {
    let (markers, snapshot) = {
        let chain = chain.read().await;
        let snapshot = match topic {
            Topic::NetworkStatus => serde_json::to_value(chain.network_status())?,
            Topic::ValidatorList(kind) => serde_json::to_value(chain.validator_list(*kind))?,
            Topic::ValidatorDetails(account_id) => match chain.validator_details(account_id) {
                Some(details) => serde_json::to_value(details)?,
                None => {
                    drop(chain);
                    reject(
                        sink,
                        request_id,
                        "unknown_validator",
                        format!("no validator {account_id}"),
                    )
                    .await?;
                    return Ok(None);
                }
            },
        };
        (chain.markers(), snapshot)
    };

    send(
        sink,
        &ServerMessage::<_, ()>::Snapshot {
            request_id,
            subscription_id,
            best_block_number: markers.best_block_number,
            finalized_block_number: markers.finalized_block_number,
            snapshot,
        },
    )
    .await?;
    Ok(Some(markers))
}

async fn send_update(
    sink: &mut Sink,
    subscription_id: SubscriptionId,
    topic: &Topic,
    tick: &Tick,
) -> anyhow::Result<()> {
    let diff = match topic {
        Topic::NetworkStatus if tick.network.is_empty() => return Ok(()),
        Topic::NetworkStatus => serde_json::to_value(&tick.network)?,
        Topic::ValidatorList(kind) => serde_json::to_value(tick.validator_list(*kind))?,
        Topic::ValidatorDetails(account_id) => match tick.validator_details(account_id) {
            Some(diff) => serde_json::to_value(diff)?,
            None => return Ok(()),
        },
    };
    send(
        sink,
        &ServerMessage::<(), _>::Update {
            subscription_id,
            best_block_number: tick.markers.best_block_number,
            finalized_block_number: tick.markers.finalized_block_number,
            diff,
        },
    )
    .await
}
