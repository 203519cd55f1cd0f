//! Single-validator details feed.

use crate::{AccountId, Balance};
use serde::{Deserialize, Serialize};
use subvt_core::Feed;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorPreferences {
    pub commission_per_billion: u32,
    pub blocks_nominations: bool,
}

/// A nomination backing the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nomination {
    pub stash_account_id: AccountId,
    #[serde(default)]
    pub submission_era_index: u32,
    #[serde(default)]
    pub target_count: u32,
    pub stake: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDetails {
    pub account_id: AccountId,
    #[serde(default)]
    pub controller_account_id: Option<AccountId>,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub parent_display: Option<String>,
    #[serde(default)]
    pub preferences: ValidatorPreferences,
    #[serde(default)]
    pub self_stake: Balance,
    #[serde(default)]
    pub total_stake: Balance,
    #[serde(default)]
    pub active_stake: Option<Balance>,
    #[serde(default)]
    pub nominations: Vec<Nomination>,
    #[serde(default)]
    pub reward_destination: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub active_next_session: bool,
    #[serde(default)]
    pub is_para_validator: bool,
    #[serde(default)]
    pub is_enrolled_in_1kv: bool,
    #[serde(default)]
    pub oversubscribed: bool,
    #[serde(default)]
    pub slash_count: u32,
    #[serde(default)]
    pub heartbeat_received: Option<bool>,
    #[serde(default)]
    pub blocks_authored: Option<u64>,
    #[serde(default)]
    pub reward_points: Option<u64>,
    #[serde(default)]
    pub return_rate_per_billion: Option<u64>,
}

impl ValidatorDetails {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            controller_account_id: None,
            display: None,
            parent_display: None,
            preferences: ValidatorPreferences::default(),
            self_stake: Balance::default(),
            total_stake: Balance::default(),
            active_stake: None,
            nominations: Vec::new(),
            reward_destination: None,
            is_active: false,
            active_next_session: false,
            is_para_validator: false,
            is_enrolled_in_1kv: false,
            oversubscribed: false,
            slash_count: 0,
            heartbeat_received: None,
            blocks_authored: None,
            reward_points: None,
            return_rate_per_billion: None,
        }
    }

    /// Sum of the nominations' stakes.
    pub fn nominated_stake(&self) -> Balance {
        Balance(self.nominations.iter().map(|n| n.stake.0).sum())
    }
}

/// Changed fields of [`ValidatorDetails`]. `nominations` replaces the whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorDetailsDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_account_id: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<ValidatorPreferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_stake: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_stake: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_stake: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nominations: Option<Vec<Nomination>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_next_session: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_para_validator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enrolled_in_1kv: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oversubscribed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slash_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_received: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks_authored: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_points: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_rate_per_billion: Option<u64>,
}

/// The validator details feed. Subscribes with the validator's account id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorDetailsFeed;

impl ValidatorDetailsFeed {
    pub const TOPIC: &'static str = "validator_details";

    pub fn parameters(account_id: &AccountId) -> Vec<String> {
        vec![account_id.to_string()]
    }
}

impl Feed for ValidatorDetailsFeed {
    type Snapshot = ValidatorDetails;
    type Diff = ValidatorDetailsDiff;

    fn topic(&self) -> &'static str {
        Self::TOPIC
    }

    fn merge(&self, snapshot: &ValidatorDetails, diff: &ValidatorDetailsDiff) -> ValidatorDetails {
        let mut next = snapshot.clone();
        patch!(
            next,
            diff,
            [
                preferences,
                self_stake,
                total_stake,
                nominations,
                is_active,
                active_next_session,
                is_para_validator,
                is_enrolled_in_1kv,
                oversubscribed,
                slash_count,
            ]
        );
        patch!(
            next,
            diff,
            Some [
                controller_account_id,
                display,
                parent_display,
                active_stake,
                reward_destination,
                heartbeat_received,
                blocks_authored,
                reward_points,
                return_rate_per_billion,
            ]
        );
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nomination(stash: &str, stake: u128) -> Nomination {
        Nomination {
            stash_account_id: stash.into(),
            submission_era_index: 100,
            target_count: 16,
            stake: Balance(stake),
        }
    }

    fn details() -> ValidatorDetails {
        ValidatorDetails {
            self_stake: Balance(10),
            nominations: vec![nomination("n1", 5), nomination("n2", 7)],
            is_active: true,
            ..ValidatorDetails::new("v".into())
        }
    }

    #[test]
    fn nominations_are_replaced_wholesale() {
        let diff = ValidatorDetailsDiff {
            nominations: Some(vec![nomination("n3", 1)]),
            ..ValidatorDetailsDiff::default()
        };
        let next = ValidatorDetailsFeed.merge(&details(), &diff);
        assert_eq!(next.nominations, vec![nomination("n3", 1)]);
        assert_eq!(next.nominated_stake(), Balance(1));
        assert_eq!(next.self_stake, Balance(10));
    }

    #[test]
    fn merge_sets_optional_fields() {
        let diff: ValidatorDetailsDiff = serde_json::from_value(json!({
            "is_active": false,
            "blocks_authored": 3,
            "preferences": {"commission_per_billion": 50000000}
        }))
        .unwrap();
        let next = ValidatorDetailsFeed.merge(&details(), &diff);
        assert!(!next.is_active);
        assert_eq!(next.blocks_authored, Some(3));
        assert_eq!(next.preferences.commission_per_billion, 50_000_000);
        assert!(!next.preferences.blocks_nominations);
        assert_eq!(next.nominated_stake(), Balance(12));
    }

    #[test]
    fn merge_is_pure() {
        let snapshot = details();
        let diff = ValidatorDetailsDiff {
            slash_count: Some(1),
            ..ValidatorDetailsDiff::default()
        };
        let first = ValidatorDetailsFeed.merge(&snapshot, &diff);
        let second = ValidatorDetailsFeed.merge(&snapshot, &diff);
        assert_eq!(first, second);
        assert_eq!(snapshot, details());
    }

    #[test]
    fn parameters_carry_the_account() {
        assert_eq!(
            ValidatorDetailsFeed::parameters(&"HZv1".into()),
            vec!["HZv1".to_string()]
        );
    }
}
