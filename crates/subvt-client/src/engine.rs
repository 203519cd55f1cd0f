//! The subscription engine.

use crate::channel::{ChannelEvent, Connector, Outbound};
use crate::config::EngineConfig;
use crate::observable::{Observable, Watcher};
use serde_json::Value;
use std::sync::{Arc, Weak};
use subvt_core::{
    BlockMarkers, ClientMessage, Endpoint, Fault, Feed, ServerMessage, Status, Subscription,
    SubscriptionId,
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Envelope with payloads left undecoded until the identity checks pass.
type Envelope = ServerMessage<Value, Value>;

/// Drives one subscription on one feed.
///
/// Cloning is cheap; all clones drive the same engine. Every operation,
/// inbound message and timeout is serialized through one lock, so
/// `subscribe`/`unsubscribe` may be called from any task.
pub struct SubscriptionEngine<F: Feed, C: Connector> {
    shared: Arc<Shared<F, C>>,
}

impl<F: Feed, C: Connector> Clone for SubscriptionEngine<F, C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<F: Feed, C> {
    feed: F,
    connector: C,
    config: EngineConfig,
    state: Mutex<State<F>>,
    status: Observable<Status>,
    snapshot: Observable<Option<Arc<F::Snapshot>>>,
    markers: Observable<BlockMarkers>,
}

struct State<F: Feed> {
    /// Logical clock; the last issued subscribe request id.
    clock: u64,
    /// Generation of the most recently opened channel.
    generation: u64,
    channel: Option<LiveChannel>,
    /// Subscribe request awaiting its snapshot.
    pending: Option<Pending>,
    active: Option<Subscription>,
    /// Subscription whose unsubscribe ack is still outstanding.
    tearing_down: Option<SubscriptionId>,
    snapshot: Option<Arc<F::Snapshot>>,
}

struct Pending {
    request_id: u64,
    parameters: Vec<String>,
}

struct LiveChannel {
    generation: u64,
    endpoint: Endpoint,
    outbound: Outbound,
    reader: JoinHandle<()>,
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl<F: Feed> State<F> {
    fn is_current(&self, generation: u64) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| channel.generation == generation)
    }

    fn open_outbound(&self) -> Option<Outbound> {
        self.channel
            .as_ref()
            .map(|channel| channel.outbound.clone())
            .filter(Outbound::is_open)
    }

    fn is_pending(&self, request_id: u64) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| pending.request_id == request_id)
    }

    fn active_id(&self) -> Option<SubscriptionId> {
        self.active.as_ref().map(|active| active.id)
    }

    fn is_idle(&self) -> bool {
        self.pending.is_none() && self.active.is_none() && self.tearing_down.is_none()
    }
}

impl<F: Feed, C: Connector> SubscriptionEngine<F, C> {
    pub fn new(feed: F, connector: C, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                feed,
                connector,
                config,
                state: Mutex::new(State {
                    clock: 0,
                    generation: 0,
                    channel: None,
                    pending: None,
                    active: None,
                    tearing_down: None,
                    snapshot: None,
                }),
                status: Observable::new(Status::Idle),
                snapshot: Observable::new(None),
                markers: Observable::new(BlockMarkers::default()),
            }),
        }
    }

    /// Subscribe to the feed at `endpoint`.
    ///
    /// Tears down whatever subscription is active first. Returns once the
    /// subscribe request is on the wire (or the attempt failed); acceptance
    /// and failure are only observable through [`Self::status`].
    pub async fn subscribe(&self, endpoint: &Endpoint, parameters: Vec<String>) {
        let shared = &self.shared;
        let topic = shared.feed.topic();
        let mut state = shared.state.lock().await;

        shared.teardown(&mut state);

        state.clock += 1;
        let request_id = state.clock;
        state.pending = Some(Pending {
            request_id,
            parameters: parameters.clone(),
        });
        shared.set_status(Status::Connecting);

        let outbound = match shared.ensure_channel(&mut state, endpoint).await {
            Ok(outbound) => outbound,
            Err(fault) => {
                shared.fail(&mut state, fault);
                return;
            }
        };
        shared.set_status(Status::Connected);

        let request = ClientMessage::Subscribe {
            request_id,
            topic: topic.to_string(),
            parameters,
        };
        if let Err(e) = outbound.send(&request) {
            debug!(topic, request_id, error = %e, "subscribe request not sent");
            shared.fail(&mut state, Fault::Closed("send failed".to_string()));
            return;
        }

        info!(topic, request_id, %endpoint, "subscribe request sent");
        shared.spawn_handshake_timer(request_id);
    }

    /// Tear down the current subscription.
    ///
    /// The snapshot is cleared before this returns, whether or not the
    /// backend has acknowledged yet. No-op when nothing is subscribed.
    pub async fn unsubscribe(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;

        if state.active.is_none() && state.pending.is_none() {
            trace!(topic = shared.feed.topic(), "nothing to unsubscribe");
            return;
        }

        let id = state.active_id();
        shared.teardown(&mut state);
        shared.set_status(Status::Unsubscribed);

        if state.tearing_down.is_none() {
            // No ack to wait for
            state.channel = None;
        }

        match id {
            Some(id) => info!(topic = shared.feed.topic(), subscription_id = %id, "unsubscribed"),
            None => info!(topic = shared.feed.topic(), "pending subscribe cancelled"),
        }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.shared.status.get()
    }

    pub fn watch_status(&self) -> Watcher<Status> {
        self.shared.status.watch()
    }

    /// Current snapshot, absent until a subscription is accepted.
    pub fn snapshot(&self) -> Option<Arc<F::Snapshot>> {
        self.shared.snapshot.get()
    }

    pub fn watch_snapshot(&self) -> Watcher<Option<Arc<F::Snapshot>>> {
        self.shared.snapshot.watch()
    }

    /// Latest block markers seen on accepted messages.
    pub fn markers(&self) -> BlockMarkers {
        self.shared.markers.get()
    }

    /// The active subscription, if any.
    pub async fn subscription(&self) -> Option<Subscription> {
        self.shared.state.lock().await.active.clone()
    }

    pub fn feed(&self) -> &F {
        &self.shared.feed
    }
}

impl<F: Feed, C: Connector> Shared<F, C> {
    fn set_status(&self, next: Status) {
        let current = self.status.get();
        if current == next {
            return;
        }
        if !current.permits(&next) {
            warn!(topic = self.feed.topic(), from = %current, to = %next, "illegal status transition");
        }
        debug_assert!(current.permits(&next), "illegal status transition {current} -> {next}");
        debug!(topic = self.feed.topic(), from = %current, to = %next, "status");
        self.status.set(next);
    }

    fn install_snapshot(&self, state: &mut State<F>, snapshot: F::Snapshot) {
        let snapshot = Arc::new(snapshot);
        state.snapshot = Some(snapshot.clone());
        self.snapshot.replace(Some(snapshot));
    }

    fn clear_snapshot(&self, state: &mut State<F>) {
        if state.snapshot.take().is_some() {
            self.snapshot.replace(None);
        }
    }

    fn record_markers(&self, markers: BlockMarkers, fresh: bool) {
        let mut known = if fresh {
            BlockMarkers::default()
        } else {
            self.markers.get()
        };
        if known.regressed_by(&markers) {
            // Advisory only; the message is applied regardless
            debug!(
                topic = self.feed.topic(),
                known = ?known,
                incoming = ?markers,
                "block markers moved backwards"
            );
        }
        known.advance(markers);
        self.markers.set(known);
    }

    fn fail(&self, state: &mut State<F>, fault: Fault) {
        warn!(topic = self.feed.topic(), %fault, "subscription failed");
        state.pending = None;
        state.active = None;
        self.clear_snapshot(state);
        self.set_status(Status::Error(fault));
        if state.tearing_down.is_none() {
            // Nothing left on the channel; a retry opens a fresh one
            state.channel = None;
        }
    }

    /// Forget the pending request and drop the active subscription,
    /// asking the backend to release it while the channel is usable.
    fn teardown(self: &Arc<Self>, state: &mut State<F>) {
        let topic = self.feed.topic();

        if let Some(pending) = state.pending.take() {
            debug!(topic, request_id = pending.request_id, "abandoning pending subscribe request");
        }

        if let Some(active) = state.active.take() {
            let sent = state.open_outbound().is_some_and(|outbound| {
                outbound
                    .send(&ClientMessage::Unsubscribe {
                        subscription_id: active.id,
                    })
                    .is_ok()
            });
            if sent {
                debug!(topic, subscription_id = %active.id, "unsubscribe request sent");
                state.tearing_down = Some(active.id);
                if let Some(channel) = &state.channel {
                    self.spawn_unsubscribe_timer(channel.generation, active.id);
                }
            } else {
                debug!(topic, subscription_id = %active.id, "channel unusable, dropping subscription locally");
                state.channel = None;
            }
        }

        self.clear_snapshot(state);
    }

    /// Reuse the open channel to `endpoint` or open a new one.
    async fn ensure_channel(
        self: &Arc<Self>,
        state: &mut State<F>,
        endpoint: &Endpoint,
    ) -> Result<Outbound, Fault> {
        if let Some(channel) = &state.channel
            && channel.endpoint == *endpoint
            && channel.outbound.is_open()
        {
            trace!(topic = self.feed.topic(), generation = channel.generation, "reusing channel");
            return Ok(channel.outbound.clone());
        }

        if state.channel.take().is_some() {
            // Acks for the old channel can no longer arrive
            state.tearing_down = None;
        }

        let timeout = self.config.connect_timeout();
        let channel = match tokio::time::timeout(timeout, self.connector.connect(endpoint)).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => return Err(Fault::Connect(e.to_string())),
            Err(_) => return Err(Fault::Connect(format!("timed out after {timeout:?}"))),
        };

        state.generation += 1;
        let generation = state.generation;
        let (outbound, inbound) = channel.into_parts();
        let reader = tokio::spawn(read_loop(Arc::downgrade(self), generation, inbound));
        state.channel = Some(LiveChannel {
            generation,
            endpoint: endpoint.clone(),
            outbound: outbound.clone(),
            reader,
        });

        debug!(topic = self.feed.topic(), generation, %endpoint, "channel opened");
        Ok(outbound)
    }

    fn handle_frame(&self, state: &mut State<F>, text: &str) {
        let message: Envelope = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(topic = self.feed.topic(), error = %e, "dropping malformed message");
                return;
            }
        };

        trace!(topic = self.feed.topic(), kind = message.kind(), "frame");
        let markers = message.markers().unwrap_or_default();
        match message {
            ServerMessage::Snapshot {
                request_id,
                subscription_id,
                snapshot,
                ..
            } => self.on_snapshot(state, request_id, subscription_id, markers, snapshot),
            ServerMessage::Update {
                subscription_id,
                diff,
                ..
            } => self.on_update(state, subscription_id, markers, diff),
            ServerMessage::Unsubscribed { subscription_id } => {
                self.on_unsubscribed(state, subscription_id)
            }
            ServerMessage::Error {
                request_id,
                code,
                message,
            } => self.on_error(state, request_id, code, message),
        }
    }

    fn on_snapshot(
        &self,
        state: &mut State<F>,
        request_id: u64,
        subscription_id: SubscriptionId,
        markers: BlockMarkers,
        payload: Value,
    ) {
        let topic = self.feed.topic();
        let accepting = state.is_pending(request_id);
        let resync = !accepting
            && state
                .active
                .as_ref()
                .is_some_and(|active| active.id == subscription_id && active.issued_at == request_id);

        if !accepting && !resync {
            debug!(topic, request_id, %subscription_id, "discarding stale snapshot");
            self.release_orphan(state, subscription_id);
            return;
        }

        let snapshot: F::Snapshot = match serde_json::from_value(payload) {
            Ok(snapshot) => snapshot,
            Err(e) if accepting => {
                self.fail(state, Fault::Protocol(format!("malformed snapshot: {e}")));
                return;
            }
            Err(e) => {
                warn!(topic, %subscription_id, error = %e, "dropping malformed snapshot");
                return;
            }
        };

        if accepting {
            let parameters = state
                .pending
                .take()
                .map(|pending| pending.parameters)
                .unwrap_or_default();
            state.active = Some(Subscription {
                id: subscription_id,
                issued_at: request_id,
                parameters,
            });
            self.install_snapshot(state, snapshot);
            self.record_markers(markers, true);
            self.set_status(Status::Subscribed(subscription_id));
            info!(topic, request_id, %subscription_id, "subscribed");
        } else {
            self.install_snapshot(state, snapshot);
            self.record_markers(markers, false);
            debug!(topic, %subscription_id, "snapshot resynced");
        }
    }

    /// Ask the backend to drop a subscription that answered an abandoned request.
    fn release_orphan(&self, state: &State<F>, subscription_id: SubscriptionId) {
        if state.active_id() == Some(subscription_id) || state.tearing_down == Some(subscription_id) {
            return;
        }
        if let Some(outbound) = state.open_outbound() {
            let _ = outbound.send(&ClientMessage::Unsubscribe { subscription_id });
            debug!(topic = self.feed.topic(), %subscription_id, "released orphaned subscription");
        }
    }

    fn on_update(
        &self,
        state: &mut State<F>,
        subscription_id: SubscriptionId,
        markers: BlockMarkers,
        payload: Value,
    ) {
        let topic = self.feed.topic();
        if state.active_id() != Some(subscription_id) {
            debug!(topic, %subscription_id, "discarding stale update");
            return;
        }
        let Some(current) = state.snapshot.clone() else {
            return;
        };

        let diff: F::Diff = match serde_json::from_value(payload) {
            Ok(diff) => diff,
            Err(e) => {
                warn!(topic, %subscription_id, error = %e, "dropping malformed update");
                return;
            }
        };

        let next = self.feed.merge(&current, &diff);
        self.install_snapshot(state, next);
        self.record_markers(markers, false);
        trace!(topic, %subscription_id, "update merged");
    }

    fn on_unsubscribed(&self, state: &mut State<F>, subscription_id: SubscriptionId) {
        let topic = self.feed.topic();
        if state.tearing_down != Some(subscription_id) {
            debug!(topic, %subscription_id, "discarding stale unsubscribe ack");
            return;
        }

        state.tearing_down = None;
        debug!(topic, %subscription_id, "unsubscribe acknowledged");
        if state.is_idle() {
            state.channel = None;
        }
    }

    fn on_error(&self, state: &mut State<F>, request_id: Option<u64>, code: String, message: String) {
        match request_id {
            Some(request_id) if state.is_pending(request_id) => {
                self.fail(state, Fault::Rejected { code, message });
            }
            _ => warn!(topic = self.feed.topic(), ?request_id, %code, %message, "backend error"),
        }
    }

    fn channel_lost(&self, state: &mut State<F>, reason: String) {
        state.channel = None;
        state.tearing_down = None;

        if state.active.is_none() && state.pending.is_none() {
            debug!(topic = self.feed.topic(), %reason, "idle channel closed");
            return;
        }
        self.fail(state, Fault::Closed(reason));
    }

    fn spawn_handshake_timer(self: &Arc<Self>, request_id: u64) {
        let shared = Arc::downgrade(self);
        let timeout = self.config.handshake_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = shared.state.lock().await;
            if state.is_pending(request_id) {
                shared.fail(&mut state, Fault::Timeout);
            }
        });
    }

    fn spawn_unsubscribe_timer(self: &Arc<Self>, generation: u64, subscription_id: SubscriptionId) {
        let shared = Arc::downgrade(self);
        let timeout = self.config.unsubscribe_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = shared.state.lock().await;
            if !state.is_current(generation) || state.tearing_down != Some(subscription_id) {
                return;
            }
            debug!(topic = shared.feed.topic(), %subscription_id, "unsubscribe ack timed out");
            state.tearing_down = None;
            if state.is_idle() {
                state.channel = None;
            }
        });
    }
}

/// Applies inbound events of one channel generation, in delivery order.
async fn read_loop<F: Feed, C: Connector>(
    shared: Weak<Shared<F, C>>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let mut state = shared.state.lock().await;
        if !state.is_current(generation) {
            return;
        }
        match event {
            ChannelEvent::Frame(text) => shared.handle_frame(&mut state, &text),
            ChannelEvent::Closed(reason) => {
                shared.channel_lost(&mut state, reason);
                return;
            }
        }
    }

    if let Some(shared) = shared.upgrade() {
        let mut state = shared.state.lock().await;
        if state.is_current(generation) {
            shared.channel_lost(&mut state, "channel ended".to_string());
        }
    }
}

#[cfg(test)]
mod tests;
