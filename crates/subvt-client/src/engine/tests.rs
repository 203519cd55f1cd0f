use super::*;
use crate::channel::memory::{MemoryConnector, MemoryListener, RemoteEnd};
use crate::channel::{Channel, ChannelError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    best_block_number: u64,
    #[serde(default)]
    events: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CounterDiff {
    #[serde(default)]
    best_block_number: Option<u64>,
    #[serde(default)]
    event: Option<String>,
}

struct CounterFeed;

impl Feed for CounterFeed {
    type Snapshot = Counter;
    type Diff = CounterDiff;

    fn topic(&self) -> &'static str {
        "counter"
    }

    fn merge(&self, snapshot: &Counter, diff: &CounterDiff) -> Counter {
        let mut next = snapshot.clone();
        if let Some(best) = diff.best_block_number {
            next.best_block_number = best;
        }
        if let Some(event) = &diff.event {
            next.events.push(event.clone());
        }
        next
    }
}

type TestEngine = SubscriptionEngine<CounterFeed, MemoryConnector>;

fn engine_with(config: EngineConfig) -> (TestEngine, MemoryConnector, MemoryListener) {
    let (connector, listener) = MemoryConnector::new();
    let engine = SubscriptionEngine::new(CounterFeed, connector.clone(), config);
    (engine, connector, listener)
}

fn engine() -> (TestEngine, MemoryConnector, MemoryListener) {
    engine_with(EngineConfig::default())
}

fn endpoint() -> Endpoint {
    Endpoint::plain("127.0.0.1", 7888)
}

fn snapshot(request_id: u64, id: u64, body: Value) -> Envelope {
    ServerMessage::Snapshot {
        request_id,
        subscription_id: SubscriptionId(id),
        best_block_number: None,
        finalized_block_number: None,
        snapshot: body,
    }
}

fn update(id: u64, body: Value) -> Envelope {
    ServerMessage::Update {
        subscription_id: SubscriptionId(id),
        best_block_number: None,
        finalized_block_number: None,
        diff: body,
    }
}

fn ack(id: u64) -> Envelope {
    ServerMessage::Unsubscribed {
        subscription_id: SubscriptionId(id),
    }
}

async fn accept(listener: &mut MemoryListener) -> RemoteEnd {
    let (_, remote) = timeout(WAIT, listener.accept())
        .await
        .expect("connect timeout")
        .expect("listener open");
    remote
}

async fn next_message(remote: &mut RemoteEnd) -> ClientMessage {
    timeout(WAIT, remote.recv_message())
        .await
        .expect("client message timeout")
        .expect("channel open")
}

async fn expect_subscribe(remote: &mut RemoteEnd) -> u64 {
    match next_message(remote).await {
        ClientMessage::Subscribe { request_id, .. } => request_id,
        other => panic!("expected subscribe, got {other:?}"),
    }
}

async fn wait_status(engine: &TestEngine, expected: Status) {
    let mut watcher = engine.watch_status();
    timeout(WAIT, watcher.wait_for(|status| *status == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {expected}, at {}", engine.status()))
        .expect("engine alive");
}

async fn wait_snapshot(engine: &TestEngine, predicate: impl Fn(&Counter) -> bool) -> Arc<Counter> {
    let mut watcher = engine.watch_snapshot();
    timeout(
        WAIT,
        watcher.wait_for(|snapshot| snapshot.as_deref().is_some_and(&predicate)),
    )
    .await
    .expect("snapshot timeout")
    .expect("engine alive")
    .expect("snapshot present")
}

/// Subscribe and complete the handshake with subscription `id`.
async fn subscribed(engine: &TestEngine, listener: &mut MemoryListener, id: u64) -> RemoteEnd {
    engine.subscribe(&endpoint(), vec![]).await;
    let mut remote = accept(listener).await;
    let request_id = expect_subscribe(&mut remote).await;
    remote
        .send(&snapshot(request_id, id, json!({"best_block_number": 100})))
        .unwrap();
    wait_status(engine, Status::Subscribed(SubscriptionId(id))).await;
    remote
}

#[tokio::test]
async fn subscribe_then_merge_updates() {
    let (engine, _connector, mut listener) = engine();
    assert_eq!(engine.status(), Status::Idle);
    assert!(engine.snapshot().is_none());

    engine
        .subscribe(&endpoint(), vec!["active".to_string()])
        .await;
    assert_eq!(engine.status(), Status::Connected);

    let mut remote = accept(&mut listener).await;
    assert_eq!(
        next_message(&mut remote).await,
        ClientMessage::Subscribe {
            request_id: 1,
            topic: "counter".into(),
            parameters: vec!["active".into()],
        }
    );

    remote
        .send(&Envelope::Snapshot {
            request_id: 1,
            subscription_id: SubscriptionId(7),
            best_block_number: Some(100),
            finalized_block_number: Some(98),
            snapshot: json!({"best_block_number": 100}),
        })
        .unwrap();
    wait_status(&engine, Status::Subscribed(SubscriptionId(7))).await;
    assert_eq!(engine.snapshot().unwrap().best_block_number, 100);
    assert_eq!(engine.markers(), BlockMarkers::new(Some(100), Some(98)));

    let subscription = engine.subscription().await.unwrap();
    assert_eq!(subscription.id, SubscriptionId(7));
    assert_eq!(subscription.issued_at, 1);
    assert_eq!(subscription.parameters, vec!["active".to_string()]);

    remote
        .send(&Envelope::Update {
            subscription_id: SubscriptionId(7),
            best_block_number: Some(101),
            finalized_block_number: None,
            diff: json!({"best_block_number": 101}),
        })
        .unwrap();
    let snapshot = wait_snapshot(&engine, |s| s.best_block_number == 101).await;
    assert!(snapshot.events.is_empty());
    assert_eq!(engine.markers(), BlockMarkers::new(Some(101), Some(98)));
}

#[tokio::test]
async fn messages_for_other_ids_change_nothing() {
    let (engine, _connector, mut listener) = engine();
    let remote = subscribed(&engine, &mut listener, 7).await;

    remote
        .send(&update(8, json!({"best_block_number": 1, "event": "stale"})))
        .unwrap();
    remote.send(&ack(8)).unwrap();
    remote.send(&ack(7)).unwrap();
    remote
        .send(&update(7, json!({"best_block_number": 150})))
        .unwrap();

    let snapshot = wait_snapshot(&engine, |s| s.best_block_number == 150).await;
    assert!(snapshot.events.is_empty());
    assert_eq!(engine.status(), Status::Subscribed(SubscriptionId(7)));
}

#[tokio::test]
async fn resubscribe_supersedes_previous_id() {
    let (engine, _connector, mut listener) = engine();
    let mut remote = subscribed(&engine, &mut listener, 7).await;

    engine.subscribe(&endpoint(), vec![]).await;
    assert!(engine.snapshot().is_none());
    assert_eq!(engine.status(), Status::Connected);

    // Same endpoint: the channel is reused
    assert!(listener.try_accept().is_none());
    assert_eq!(
        next_message(&mut remote).await,
        ClientMessage::Unsubscribe {
            subscription_id: SubscriptionId(7)
        }
    );
    let request_id = expect_subscribe(&mut remote).await;
    assert_eq!(request_id, 2);

    remote
        .send(&snapshot(request_id, 9, json!({"best_block_number": 500})))
        .unwrap();
    wait_status(&engine, Status::Subscribed(SubscriptionId(9))).await;

    remote
        .send(&update(7, json!({"best_block_number": 999, "event": "stale"})))
        .unwrap();
    remote.send(&update(9, json!({"event": "live"}))).unwrap();

    let snapshot = wait_snapshot(&engine, |s| !s.events.is_empty()).await;
    assert_eq!(snapshot.events, vec!["live".to_string()]);
    assert_eq!(snapshot.best_block_number, 500);
}

#[tokio::test]
async fn snapshot_for_abandoned_request_is_released() {
    let (engine, _connector, mut listener) = engine();

    engine.subscribe(&endpoint(), vec![]).await;
    let mut remote = accept(&mut listener).await;
    assert_eq!(expect_subscribe(&mut remote).await, 1);

    engine.subscribe(&endpoint(), vec![]).await;
    assert_eq!(expect_subscribe(&mut remote).await, 2);

    remote
        .send(&snapshot(1, 5, json!({"best_block_number": 1})))
        .unwrap();
    assert_eq!(
        next_message(&mut remote).await,
        ClientMessage::Unsubscribe {
            subscription_id: SubscriptionId(5)
        }
    );
    assert_eq!(engine.status(), Status::Connected);
    assert!(engine.snapshot().is_none());

    remote
        .send(&snapshot(2, 6, json!({"best_block_number": 2})))
        .unwrap();
    wait_status(&engine, Status::Subscribed(SubscriptionId(6))).await;
    assert_eq!(engine.snapshot().unwrap().best_block_number, 2);
}

#[tokio::test]
async fn unsubscribe_clears_state_before_the_ack() {
    let (engine, _connector, mut listener) = engine();
    let mut remote = subscribed(&engine, &mut listener, 7).await;

    engine.unsubscribe().await;
    assert!(engine.snapshot().is_none());
    assert!(engine.subscription().await.is_none());
    assert_eq!(engine.status(), Status::Unsubscribed);

    assert_eq!(
        next_message(&mut remote).await,
        ClientMessage::Unsubscribe {
            subscription_id: SubscriptionId(7)
        }
    );

    // In flight before the ack
    remote
        .send(&update(7, json!({"best_block_number": 101})))
        .unwrap();
    remote.send(&ack(7)).unwrap();

    // The ack releases the idle channel
    assert_eq!(timeout(WAIT, remote.recv()).await.unwrap(), None);
    assert!(engine.snapshot().is_none());
    assert_eq!(engine.status(), Status::Unsubscribed);
}

#[tokio::test]
async fn unsubscribe_without_subscription_is_a_no_op() {
    let (engine, _connector, mut listener) = engine();
    engine.unsubscribe().await;
    assert_eq!(engine.status(), Status::Idle);
    assert!(listener.try_accept().is_none());
}

#[tokio::test]
async fn unsubscribe_cancels_pending_request() {
    let (engine, _connector, mut listener) = engine();
    engine.subscribe(&endpoint(), vec![]).await;
    let mut remote = accept(&mut listener).await;
    let request_id = expect_subscribe(&mut remote).await;

    engine.unsubscribe().await;
    assert_eq!(engine.status(), Status::Unsubscribed);

    // Nothing to acknowledge, so the channel goes right away
    assert_eq!(timeout(WAIT, remote.recv()).await.unwrap(), None);

    let _ = remote.send(&snapshot(request_id, 3, json!({"best_block_number": 1})));
    assert!(engine.snapshot().is_none());
    assert_eq!(engine.status(), Status::Unsubscribed);
}

#[tokio::test]
async fn connect_failure_is_reported_and_recoverable() {
    let (engine, connector, mut listener) = engine();
    connector.refuse_connections(true);

    engine.subscribe(&endpoint(), vec![]).await;
    assert!(matches!(engine.status(), Status::Error(Fault::Connect(_))));
    assert!(engine.snapshot().is_none());

    connector.refuse_connections(false);
    engine.subscribe(&endpoint(), vec![]).await;
    assert_eq!(engine.status(), Status::Connected);
    let mut remote = accept(&mut listener).await;
    let request_id = expect_subscribe(&mut remote).await;
    remote
        .send(&snapshot(request_id, 1, json!({"best_block_number": 5})))
        .unwrap();
    wait_status(&engine, Status::Subscribed(SubscriptionId(1))).await;
}

#[tokio::test]
async fn channel_close_faults_the_subscription() {
    let (engine, _connector, mut listener) = engine();
    let remote = subscribed(&engine, &mut listener, 7).await;

    remote.close("reset by peer");
    let _ = remote.send(&update(7, json!({"best_block_number": 1})));
    wait_status(&engine, Status::Error(Fault::Closed("reset by peer".into()))).await;
    assert!(engine.snapshot().is_none());
    assert!(engine.subscription().await.is_none());

    // Recovery needs a fresh subscribe on a fresh channel
    engine.subscribe(&endpoint(), vec![]).await;
    let mut fresh = accept(&mut listener).await;
    let request_id = expect_subscribe(&mut fresh).await;
    fresh
        .send(&snapshot(request_id, 8, json!({"best_block_number": 7})))
        .unwrap();
    wait_status(&engine, Status::Subscribed(SubscriptionId(8))).await;
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_fails_the_attempt() {
    let (engine, _connector, mut listener) = engine_with(EngineConfig {
        handshake_timeout_ms: 500,
        ..EngineConfig::default()
    });

    engine.subscribe(&endpoint(), vec![]).await;
    let mut remote = accept(&mut listener).await;
    let request_id = expect_subscribe(&mut remote).await;

    wait_status(&engine, Status::Error(Fault::Timeout)).await;
    assert_eq!(request_id, 1);

    // The idle channel is released; a late answer can no longer arrive
    assert_eq!(timeout(WAIT, remote.recv()).await.unwrap(), None);
    assert_eq!(engine.status(), Status::Error(Fault::Timeout));
    assert!(engine.snapshot().is_none());

    engine.subscribe(&endpoint(), vec![]).await;
    let mut fresh = accept(&mut listener).await;
    assert_eq!(expect_subscribe(&mut fresh).await, 2);
}

#[tokio::test(start_paused = true)]
async fn missing_unsubscribe_ack_releases_channel() {
    let (engine, _connector, mut listener) = engine_with(EngineConfig {
        unsubscribe_timeout_ms: 1_000,
        ..EngineConfig::default()
    });
    let mut remote = subscribed(&engine, &mut listener, 7).await;

    engine.unsubscribe().await;
    assert_eq!(
        next_message(&mut remote).await,
        ClientMessage::Unsubscribe {
            subscription_id: SubscriptionId(7)
        }
    );
    assert_eq!(timeout(WAIT, remote.recv()).await.unwrap(), None);
    assert_eq!(engine.status(), Status::Unsubscribed);
}

#[tokio::test]
async fn malformed_snapshot_fails_the_handshake() {
    let (engine, _connector, mut listener) = engine();
    engine.subscribe(&endpoint(), vec![]).await;
    let mut remote = accept(&mut listener).await;
    let request_id = expect_subscribe(&mut remote).await;

    remote
        .send(&snapshot(request_id, 4, json!({"best_block_number": "soon"})))
        .unwrap();

    let mut watcher = engine.watch_status();
    let status = timeout(WAIT, watcher.wait_for(|status| matches!(status, Status::Error(_))))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(status, Status::Error(Fault::Protocol(_))));
    assert!(engine.snapshot().is_none());
}

#[tokio::test]
async fn malformed_messages_are_dropped() {
    let (engine, _connector, mut listener) = engine();
    let remote = subscribed(&engine, &mut listener, 7).await;

    remote.send_frame("{not json").unwrap();
    remote.send_frame(r#"{"type":"heartbeat"}"#).unwrap();
    remote
        .send(&update(7, json!({"best_block_number": "later"})))
        .unwrap();
    remote
        .send(&update(7, json!({"best_block_number": 120})))
        .unwrap();

    wait_snapshot(&engine, |s| s.best_block_number == 120).await;
    assert_eq!(engine.status(), Status::Subscribed(SubscriptionId(7)));
}

#[tokio::test]
async fn backend_rejection_fails_the_handshake() {
    let (engine, _connector, mut listener) = engine();
    engine.subscribe(&endpoint(), vec!["nobody".into()]).await;
    let mut remote = accept(&mut listener).await;
    let request_id = expect_subscribe(&mut remote).await;

    // Errors naming other requests are only logged
    remote
        .send(&Envelope::Error {
            request_id: Some(request_id + 10),
            code: "busy".into(),
            message: "try later".into(),
        })
        .unwrap();
    remote
        .send(&Envelope::Error {
            request_id: Some(request_id),
            code: "unknown_account".into(),
            message: "no such validator".into(),
        })
        .unwrap();

    wait_status(
        &engine,
        Status::Error(Fault::Rejected {
            code: "unknown_account".into(),
            message: "no such validator".into(),
        }),
    )
    .await;
    assert_eq!(timeout(WAIT, remote.recv()).await.unwrap(), None);
}

struct ClosedConnector;

impl Connector for ClosedConnector {
    async fn connect(&self, _endpoint: &Endpoint) -> Result<Channel, ChannelError> {
        let (channel, remote) = Channel::pair();
        drop(remote);
        Ok(channel)
    }
}

#[tokio::test]
async fn failed_send_is_reported_as_closed() {
    let engine = SubscriptionEngine::new(CounterFeed, ClosedConnector, EngineConfig::default());

    engine.subscribe(&endpoint(), vec![]).await;

    assert_eq!(
        engine.status(),
        Status::Error(Fault::Closed("send failed".into()))
    );
    assert_eq!(
        engine.status().to_string(),
        "error(channel closed: send failed)"
    );
    assert!(engine.subscription().await.is_none());
}

#[tokio::test]
async fn resync_snapshot_replaces_state() {
    let (engine, _connector, mut listener) = engine();
    let remote = subscribed(&engine, &mut listener, 7).await;

    remote
        .send(&update(7, json!({"event": "before"})))
        .unwrap();
    remote
        .send(&snapshot(1, 7, json!({"best_block_number": 300})))
        .unwrap();

    let snapshot = wait_snapshot(&engine, |s| s.best_block_number == 300).await;
    assert!(snapshot.events.is_empty());
    assert_eq!(engine.status(), Status::Subscribed(SubscriptionId(7)));
}

#[tokio::test]
async fn markers_are_advisory() {
    let (engine, _connector, mut listener) = engine();
    let remote = subscribed(&engine, &mut listener, 7).await;

    remote
        .send(&Envelope::Update {
            subscription_id: SubscriptionId(7),
            best_block_number: Some(90),
            finalized_block_number: None,
            diff: json!({"best_block_number": 90}),
        })
        .unwrap();

    wait_snapshot(&engine, |s| s.best_block_number == 90).await;
    assert_eq!(engine.markers().best_block_number, Some(90));
}

#[tokio::test]
async fn new_endpoint_replaces_the_channel() {
    let (engine, _connector, mut listener) = engine();
    let mut old = subscribed(&engine, &mut listener, 7).await;

    let other = Endpoint::plain("127.0.0.1", 7999);
    engine.subscribe(&other, vec![]).await;

    let (endpoint, mut fresh) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    assert_eq!(endpoint, other);
    assert_eq!(expect_subscribe(&mut fresh).await, 2);

    // The old channel still flushes the unsubscribe before it goes away
    assert_eq!(
        next_message(&mut old).await,
        ClientMessage::Unsubscribe {
            subscription_id: SubscriptionId(7)
        }
    );
    assert_eq!(timeout(WAIT, old.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn dropping_the_engine_releases_the_channel() {
    let (engine, _connector, mut listener) = engine();
    let mut remote = subscribed(&engine, &mut listener, 7).await;

    drop(engine);
    assert_eq!(timeout(WAIT, remote.recv()).await.unwrap(), None);
}
