//! Client-side subscription engine for SubVT feeds.
//!
//! A [`SubscriptionEngine`] owns one logical subscription on one [`Feed`]:
//! it drives a [`Channel`] through the subscribe/unsubscribe handshake,
//! drops stale messages by subscription id, merges diffs into the held
//! snapshot and publishes snapshot and [`Status`] changes to observers.
//!
//! The engine never retries on its own. Callers watch the status and call
//! [`SubscriptionEngine::subscribe`] again when they want to recover.

pub mod channel;
mod config;
mod engine;
mod observable;
mod ws;

pub use channel::{Channel, ChannelError, ChannelEvent, Connector};
pub use config::EngineConfig;
pub use engine::SubscriptionEngine;
pub use observable::{Observable, Watcher};
pub use ws::WsConnector;

pub use subvt_core::{BlockMarkers, Endpoint, Fault, Feed, Status, Subscription, SubscriptionId};
