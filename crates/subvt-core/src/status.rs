//! Subscription lifecycle status.

use crate::SubscriptionId;
use std::fmt;

/// Connection and subscription lifecycle state of one engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// Opening (or reusing) the channel.
    Connecting,
    /// Channel established, subscribe request sent.
    Connected,
    /// Initial snapshot accepted under this id.
    Subscribed(SubscriptionId),
    /// Torn down by the caller.
    Unsubscribed,
    /// Transport fault, protocol violation or timeout.
    Error(Fault),
}

impl Status {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Any state may fail into `Error`, and any state may start over with
    /// `Connecting` since a subscribe always tears down what came before.
    pub fn permits(&self, next: &Status) -> bool {
        match (self, next) {
            (_, Status::Error(_)) | (_, Status::Connecting) => true,
            (Status::Connecting, Status::Connected) => true,
            (Status::Connected, Status::Subscribed(_)) => true,
            (Status::Connected | Status::Subscribed(_), Status::Unsubscribed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => f.write_str("idle"),
            Status::Connecting => f.write_str("connecting"),
            Status::Connected => f.write_str("connected"),
            Status::Subscribed(id) => write!(f, "subscribed({id})"),
            Status::Unsubscribed => f.write_str("unsubscribed"),
            Status::Error(fault) => write!(f, "error({fault})"),
        }
    }
}

/// Cause carried by [`Status::Error`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("channel closed: {0}")]
    Closed(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("handshake timed out")]
    Timeout,
    #[error("subscription rejected ({code}): {message}")]
    Rejected { code: String, message: String },
}
