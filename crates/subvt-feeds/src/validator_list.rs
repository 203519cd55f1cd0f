//! Active/inactive validator list feed.

use crate::{AccountId, Balance};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subvt_core::Feed;

/// One row of the validator list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSummary {
    pub account_id: AccountId,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub parent_display: Option<String>,
    #[serde(default)]
    pub controller_account_id: Option<AccountId>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_para_validator: bool,
    #[serde(default)]
    pub is_enrolled_in_1kv: bool,
    #[serde(default)]
    pub oversubscribed: bool,
    #[serde(default)]
    pub blocks_nominations: bool,
    #[serde(default)]
    pub commission_per_billion: u32,
    #[serde(default)]
    pub self_stake: Balance,
    #[serde(default)]
    pub total_stake: Option<Balance>,
    #[serde(default)]
    pub nomination_count: u32,
    #[serde(default)]
    pub heartbeat_received: Option<bool>,
    #[serde(default)]
    pub slash_count: u32,
    #[serde(default)]
    pub blocks_authored: Option<u64>,
    #[serde(default)]
    pub reward_points: Option<u64>,
}

impl ValidatorSummary {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            display: None,
            parent_display: None,
            controller_account_id: None,
            is_active: false,
            is_para_validator: false,
            is_enrolled_in_1kv: false,
            oversubscribed: false,
            blocks_nominations: false,
            commission_per_billion: 0,
            self_stake: Balance::default(),
            total_stake: None,
            nomination_count: 0,
            heartbeat_received: None,
            slash_count: 0,
            blocks_authored: None,
            reward_points: None,
        }
    }

    /// Identity display, `parent/child` for sub-identities.
    pub fn display_name(&self) -> Option<String> {
        match (&self.parent_display, &self.display) {
            (Some(parent), Some(child)) => Some(format!("{parent}/{child}")),
            (Some(name), None) | (None, Some(name)) => Some(name.clone()),
            (None, None) => None,
        }
    }
}

/// Changed fields of one validator; `account_id` selects the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSummaryDiff {
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_para_validator: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enrolled_in_1kv: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oversubscribed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks_nominations: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_per_billion: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_stake: Option<Balance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_stake: Option<Balance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nomination_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_received: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slash_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks_authored: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_points: Option<u64>,
}

impl ValidatorSummaryDiff {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            display: None,
            parent_display: None,
            controller_account_id: None,
            is_active: None,
            is_para_validator: None,
            is_enrolled_in_1kv: None,
            oversubscribed: None,
            blocks_nominations: None,
            commission_per_billion: None,
            self_stake: None,
            total_stake: None,
            nomination_count: None,
            heartbeat_received: None,
            slash_count: None,
            blocks_authored: None,
            reward_points: None,
        }
    }

    fn apply(&self, summary: &mut ValidatorSummary) {
        let diff = self;
        patch!(
            summary,
            diff,
            [
                is_active,
                is_para_validator,
                is_enrolled_in_1kv,
                oversubscribed,
                blocks_nominations,
                commission_per_billion,
                self_stake,
                nomination_count,
                slash_count,
            ]
        );
        patch!(
            summary,
            diff,
            Some [
                display,
                parent_display,
                controller_account_id,
                total_stake,
                heartbeat_received,
                blocks_authored,
                reward_points,
            ]
        );
    }
}

/// Validators in backend order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorList {
    #[serde(default)]
    pub finalized_block_number: Option<u64>,
    #[serde(default)]
    pub validators: Vec<ValidatorSummary>,
}

impl ValidatorList {
    pub fn get(&self, account_id: &AccountId) -> Option<&ValidatorSummary> {
        self.validators.iter().find(|v| v.account_id == *account_id)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

/// Insertions, field updates and removals since the last message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorListDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_block_number: Option<u64>,
    pub insert: Vec<ValidatorSummary>,
    pub update: Vec<ValidatorSummaryDiff>,
    pub remove_ids: Vec<AccountId>,
}

/// Which half of the validator set a list subscription follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidatorListKind {
    #[default]
    Active,
    Inactive,
}

impl fmt::Display for ValidatorListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorListKind::Active => f.write_str("active"),
            ValidatorListKind::Inactive => f.write_str("inactive"),
        }
    }
}

impl FromStr for ValidatorListKind {
    type Err = UnknownListKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ValidatorListKind::Active),
            "inactive" => Ok(ValidatorListKind::Inactive),
            other => Err(UnknownListKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown validator list kind: {0}")]
pub struct UnknownListKind(pub String);

/// The validator list feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorListFeed;

impl ValidatorListFeed {
    pub const TOPIC: &'static str = "validator_list";

    /// Subscribe parameters selecting one half of the validator set.
    pub fn parameters(kind: ValidatorListKind) -> Vec<String> {
        vec![kind.to_string()]
    }
}

impl Feed for ValidatorListFeed {
    type Snapshot = ValidatorList;
    type Diff = ValidatorListDiff;

    fn topic(&self) -> &'static str {
        Self::TOPIC
    }

    /// Removals first, then updates (unknown rows are skipped), then
    /// insertions, which replace a row with the same id in place.
    fn merge(&self, snapshot: &ValidatorList, diff: &ValidatorListDiff) -> ValidatorList {
        let mut validators: Vec<ValidatorSummary> = snapshot
            .validators
            .iter()
            .filter(|v| !diff.remove_ids.contains(&v.account_id))
            .cloned()
            .collect();

        for update in &diff.update {
            if let Some(summary) = validators
                .iter_mut()
                .find(|v| v.account_id == update.account_id)
            {
                update.apply(summary);
            }
        }

        for inserted in &diff.insert {
            match validators
                .iter_mut()
                .find(|v| v.account_id == inserted.account_id)
            {
                Some(existing) => *existing = inserted.clone(),
                None => validators.push(inserted.clone()),
            }
        }

        ValidatorList {
            finalized_block_number: diff
                .finalized_block_number
                .or(snapshot.finalized_block_number),
            validators,
        }
    }
}
