//! Protocol messages.
//!
//! Server messages are generic over the feed's Snapshot and Diff types.
//! Feeds define their own types; this crate provides the envelope.

use crate::{BlockMarkers, SubscriptionId};
use serde::{Deserialize, Serialize};

/// Messages sent from client to backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a subscription on a feed topic.
    Subscribe {
        /// Logical clock value identifying this request; echoed in the snapshot.
        request_id: u64,
        topic: String,
        #[serde(default)]
        parameters: Vec<String>,
    },
    /// Tear down an accepted subscription.
    Unsubscribe { subscription_id: SubscriptionId },
}

/// Messages sent from backend to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<S, D> {
    /// Full state, answering a subscribe request.
    Snapshot {
        request_id: u64,
        subscription_id: SubscriptionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        best_block_number: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finalized_block_number: Option<u64>,
        snapshot: S,
    },
    /// Incremental change to the state of a live subscription.
    Update {
        subscription_id: SubscriptionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        best_block_number: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finalized_block_number: Option<u64>,
        diff: D,
    },
    /// Acknowledges an unsubscribe request.
    Unsubscribed { subscription_id: SubscriptionId },
    /// Error or rejection.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        code: String,
        message: String,
    },
}

impl<S, D> ServerMessage<S, D> {
    /// Block markers carried by the message, if it is a snapshot or update.
    pub fn markers(&self) -> Option<BlockMarkers> {
        match self {
            Self::Snapshot {
                best_block_number,
                finalized_block_number,
                ..
            }
            | Self::Update {
                best_block_number,
                finalized_block_number,
                ..
            } => Some(BlockMarkers::new(*best_block_number, *finalized_block_number)),
            _ => None,
        }
    }

    /// Short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Update { .. } => "update",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Error { .. } => "error",
        }
    }
}
