//! Network-wide status feed.

use crate::Balance;
use serde::{Deserialize, Serialize};
use subvt_core::Feed;

/// Current state of the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkStatus {
    pub best_block_number: u64,
    pub best_block_hash: String,
    pub finalized_block_number: u64,
    pub finalized_block_hash: String,
    pub active_era: u32,
    pub current_epoch: u64,
    pub active_validator_count: u32,
    pub inactive_validator_count: u32,
    pub last_era_total_reward: Balance,
    pub total_stake: Balance,
    pub return_rate_per_million: u32,
    pub min_stake: Balance,
    pub max_stake: Balance,
    pub average_stake: Balance,
    pub median_stake: Balance,
}

/// Fields of [`NetworkStatus`] that changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkStatusDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_era: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_epoch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_validator_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive_validator_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_era_total_reward: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_stake: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_rate_per_million: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stake: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stake: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_stake: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_stake: Option<Balance>,
}

impl NetworkStatusDiff {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The network status feed. Subscribes with no parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkStatusFeed;

impl NetworkStatusFeed {
    pub const TOPIC: &'static str = "network_status";
}

impl Feed for NetworkStatusFeed {
    type Snapshot = NetworkStatus;
    type Diff = NetworkStatusDiff;

    fn topic(&self) -> &'static str {
        Self::TOPIC
    }

    fn merge(&self, snapshot: &NetworkStatus, diff: &NetworkStatusDiff) -> NetworkStatus {
        let mut next = snapshot.clone();
        patch!(
            next,
            diff,
            [
                best_block_number,
                best_block_hash,
                finalized_block_number,
                finalized_block_hash,
                active_era,
                current_epoch,
                active_validator_count,
                inactive_validator_count,
                last_era_total_reward,
                total_stake,
                return_rate_per_million,
                min_stake,
                max_stake,
                average_stake,
                median_stake,
            ]
        );
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_snapshot_decodes() {
        let status: NetworkStatus = serde_json::from_value(json!({"best_block_number": 100})).unwrap();
        assert_eq!(status.best_block_number, 100);
        assert_eq!(status.total_stake, Balance(0));
    }

    #[test]
    fn merge_replaces_present_fields_only() {
        let status = NetworkStatus {
            best_block_number: 100,
            finalized_block_number: 98,
            active_era: 4_000,
            total_stake: Balance(7_000_000),
            ..NetworkStatus::default()
        };
        let diff: NetworkStatusDiff = serde_json::from_value(json!({
            "best_block_number": 101,
            "best_block_hash": "0xab",
            "total_stake": "7000001"
        }))
        .unwrap();

        let next = NetworkStatusFeed.merge(&status, &diff);
        assert_eq!(next.best_block_number, 101);
        assert_eq!(next.best_block_hash, "0xab");
        assert_eq!(next.total_stake, Balance(7_000_001));
        assert_eq!(next.finalized_block_number, 98);
        assert_eq!(next.active_era, 4_000);
    }

    #[test]
    fn merge_is_pure() {
        let status = NetworkStatus {
            best_block_number: 100,
            ..NetworkStatus::default()
        };
        let original = status.clone();
        let diff = NetworkStatusDiff {
            best_block_number: Some(101),
            ..NetworkStatusDiff::default()
        };

        let first = NetworkStatusFeed.merge(&status, &diff);
        let second = NetworkStatusFeed.merge(&status, &diff);
        assert_eq!(first, second);
        assert_eq!(status, original);
    }

    #[test]
    fn empty_diff_is_identity() {
        let status = NetworkStatus {
            best_block_number: 5,
            ..NetworkStatus::default()
        };
        let diff = NetworkStatusDiff::default();
        assert!(diff.is_empty());
        assert_eq!(NetworkStatusFeed.merge(&status, &diff), status);
        assert_eq!(serde_json::to_value(&diff).unwrap(), json!({}));
    }
}
