//! Core types and traits for SubVT feed subscriptions.
//!
//! This crate provides the protocol primitives. Feeds define their own
//! Snapshot and Diff types through [`Feed`]; this crate provides the envelope,
//! the subscription identity and the status state machine.

mod endpoint;
mod feed;
mod message;
mod status;

pub use endpoint::{Endpoint, EndpointParseError};
pub use feed::Feed;
pub use message::{ClientMessage, ServerMessage};
pub use status::{Fault, Status};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend-assigned identifier of one subscribe/unsubscribe generation.
///
/// Unique for the lifetime of a channel. Comparing ids is the only mechanism
/// used to tell live messages apart from stale ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SubscriptionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An accepted subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Id assigned by the backend.
    pub id: SubscriptionId,
    /// Logical clock value of the subscribe request that produced it.
    pub issued_at: u64,
    /// Parameters the subscription was requested with.
    pub parameters: Vec<String>,
}

/// Advisory block-number markers attached to snapshot and update messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMarkers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_block_number: Option<u64>,
}

impl BlockMarkers {
    pub fn new(best_block_number: Option<u64>, finalized_block_number: Option<u64>) -> Self {
        Self {
            best_block_number,
            finalized_block_number,
        }
    }

    /// Fold newer markers into these, keeping known values that the newer
    /// message omitted.
    pub fn advance(&mut self, newer: BlockMarkers) {
        if newer.best_block_number.is_some() {
            self.best_block_number = newer.best_block_number;
        }
        if newer.finalized_block_number.is_some() {
            self.finalized_block_number = newer.finalized_block_number;
        }
    }

    /// Whether `newer` moves either marker backwards relative to `self`.
    pub fn regressed_by(&self, newer: &BlockMarkers) -> bool {
        fn behind(known: Option<u64>, incoming: Option<u64>) -> bool {
            matches!((known, incoming), (Some(known), Some(incoming)) if incoming < known)
        }
        behind(self.best_block_number, newer.best_block_number)
            || behind(self.finalized_block_number, newer.finalized_block_number)
    }
}
