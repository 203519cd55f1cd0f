//! SubVT feed adapters.
//!
//! Each feed supplies its wire schema, its subscribe parameters and a pure
//! merge function; the subscription engine is shared.

/// Copy the fields present in a diff onto a snapshot.
///
/// `patch!(next, diff, [a, b])` assigns plain fields; `patch!(next, diff, Some [c])`
/// assigns into `Option` fields.
macro_rules! patch {
    ($target:ident, $diff:ident, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = &$diff.$field {
                $target.$field = value.clone();
            }
        )*
    };
    ($target:ident, $diff:ident, Some [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = &$diff.$field {
                $target.$field = Some(value.clone());
            }
        )*
    };
}

mod network_status;
mod types;
mod validator_details;
mod validator_list;

pub use network_status::{NetworkStatus, NetworkStatusDiff, NetworkStatusFeed};
pub use types::{AccountId, Balance, BalanceParseError};
pub use validator_details::{
    Nomination, ValidatorDetails, ValidatorDetailsDiff, ValidatorDetailsFeed, ValidatorPreferences,
};
pub use validator_list::{
    UnknownListKind, ValidatorList, ValidatorListDiff, ValidatorListFeed, ValidatorListKind,
    ValidatorSummary, ValidatorSummaryDiff,
};

use std::fmt;
use std::str::FromStr;

/// The feeds a network serves, each on its own endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    NetworkStatus,
    ValidatorList,
    ValidatorDetails,
}

impl FeedKind {
    /// Topic name used in subscribe requests.
    pub fn topic(&self) -> &'static str {
        match self {
            FeedKind::NetworkStatus => NetworkStatusFeed::TOPIC,
            FeedKind::ValidatorList => ValidatorListFeed::TOPIC,
            FeedKind::ValidatorDetails => ValidatorDetailsFeed::TOPIC,
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

impl FromStr for FeedKind {
    type Err = UnknownFeed;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            NetworkStatusFeed::TOPIC => Ok(FeedKind::NetworkStatus),
            ValidatorListFeed::TOPIC => Ok(FeedKind::ValidatorList),
            ValidatorDetailsFeed::TOPIC => Ok(FeedKind::ValidatorDetails),
            other => Err(UnknownFeed(other.to_string())),
        }
    }
}

/// A topic name no feed answers to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feed: {0}")]
pub struct UnknownFeed(pub String);
