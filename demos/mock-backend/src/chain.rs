//! Synthetic chain advanced one block per tick.

use subvt_core::BlockMarkers;
use subvt_feeds::{
    AccountId, Balance, NetworkStatus, NetworkStatusDiff, Nomination, ValidatorDetails,
    ValidatorDetailsDiff, ValidatorList, ValidatorListDiff, ValidatorListKind,
    ValidatorPreferences, ValidatorSummary, ValidatorSummaryDiff,
};

const UNIT: u128 = 10_000_000_000;
const EPOCH_LENGTH: u64 = 60;
const ERA_LENGTH: u64 = 360;
const ROTATION_PERIOD: u64 = 10;
const FINALITY_LAG: u64 = 2;
const POINTS_PER_BLOCK: u64 = 20;

/// Changes produced by one block, per feed.
#[derive(Debug, Clone)]
pub struct Tick {
    pub markers: BlockMarkers,
    pub network: NetworkStatusDiff,
    pub active: ValidatorListDiff,
    pub inactive: ValidatorListDiff,
    pub details: Vec<(AccountId, ValidatorDetailsDiff)>,
}

impl Tick {
    pub fn validator_list(&self, kind: ValidatorListKind) -> &ValidatorListDiff {
        match kind {
            ValidatorListKind::Active => &self.active,
            ValidatorListKind::Inactive => &self.inactive,
        }
    }

    pub fn validator_details(&self, account_id: &AccountId) -> Option<&ValidatorDetailsDiff> {
        self.details
            .iter()
            .find(|(id, _)| id == account_id)
            .map(|(_, diff)| diff)
    }
}

#[derive(Debug)]
pub struct Chain {
    best: u64,
    finalized: u64,
    validators: Vec<ValidatorDetails>,
}

impl Chain {
    pub fn new(validator_count: usize, active_count: usize) -> Self {
        let validators = (0..validator_count)
            .map(|i| validator(i, i < active_count))
            .collect();
        let best = 1_000;
        Self {
            best,
            finalized: best - FINALITY_LAG,
            validators,
        }
    }

    pub fn markers(&self) -> BlockMarkers {
        BlockMarkers::new(Some(self.best), Some(self.finalized))
    }

    pub fn network_status(&self) -> NetworkStatus {
        let mut stakes: Vec<u128> = self
            .validators
            .iter()
            .filter(|v| v.is_active)
            .map(|v| v.total_stake.0)
            .collect();
        stakes.sort_unstable();
        let total: u128 = stakes.iter().sum();
        let active = stakes.len() as u32;

        NetworkStatus {
            best_block_number: self.best,
            best_block_hash: block_hash(self.best),
            finalized_block_number: self.finalized,
            finalized_block_hash: block_hash(self.finalized),
            active_era: (self.best / ERA_LENGTH) as u32,
            current_epoch: self.best / EPOCH_LENGTH,
            active_validator_count: active,
            inactive_validator_count: self.validators.len() as u32 - active,
            last_era_total_reward: Balance(250 * UNIT),
            total_stake: Balance(total),
            return_rate_per_million: 145_000,
            min_stake: Balance(stakes.first().copied().unwrap_or_default()),
            max_stake: Balance(stakes.last().copied().unwrap_or_default()),
            average_stake: Balance(total.checked_div(u128::from(active)).unwrap_or_default()),
            median_stake: Balance(stakes.get(stakes.len() / 2).copied().unwrap_or_default()),
        }
    }

    pub fn validator_list(&self, kind: ValidatorListKind) -> ValidatorList {
        let active = kind == ValidatorListKind::Active;
        ValidatorList {
            finalized_block_number: Some(self.finalized),
            validators: self
                .validators
                .iter()
                .filter(|v| v.is_active == active)
                .map(summary)
                .collect(),
        }
    }

    pub fn validator_details(&self, account_id: &AccountId) -> Option<ValidatorDetails> {
        self.validators
            .iter()
            .find(|v| v.account_id == *account_id)
            .cloned()
    }

    /// Produce the next block.
    pub fn tick(&mut self) -> Tick {
        let before = self.network_status();
        self.best += 1;
        self.finalized = self.best - FINALITY_LAG;

        let mut active = ValidatorListDiff {
            finalized_block_number: Some(self.finalized),
            ..ValidatorListDiff::default()
        };
        let mut inactive = ValidatorListDiff {
            finalized_block_number: Some(self.finalized),
            ..ValidatorListDiff::default()
        };
        let mut details = Vec::new();

        let active_indices: Vec<usize> = (0..self.validators.len())
            .filter(|&i| self.validators[i].is_active)
            .collect();
        if !active_indices.is_empty() {
            let author = &mut self.validators
                [active_indices[(self.best % active_indices.len() as u64) as usize]];
            let blocks = author.blocks_authored.unwrap_or(0) + 1;
            let points = author.reward_points.unwrap_or(0) + POINTS_PER_BLOCK;
            author.blocks_authored = Some(blocks);
            author.reward_points = Some(points);
            active.update.push(ValidatorSummaryDiff {
                blocks_authored: Some(blocks),
                reward_points: Some(points),
                ..ValidatorSummaryDiff::new(author.account_id.clone())
            });
            details.push((
                author.account_id.clone(),
                ValidatorDetailsDiff {
                    blocks_authored: Some(blocks),
                    reward_points: Some(points),
                    ..ValidatorDetailsDiff::default()
                },
            ));
        }

        if self.best % ROTATION_PERIOD == 0 {
            let demoted = self.validators.iter().position(|v| v.is_active);
            let promoted = self.validators.iter().position(|v| !v.is_active);
            if let (Some(demoted), Some(promoted)) = (demoted, promoted) {
                for (index, now_active) in [(demoted, false), (promoted, true)] {
                    let validator = &mut self.validators[index];
                    validator.is_active = now_active;
                    validator.active_next_session = now_active;
                    let (from, to) = if now_active {
                        (&mut inactive, &mut active)
                    } else {
                        (&mut active, &mut inactive)
                    };
                    from.remove_ids.push(validator.account_id.clone());
                    to.insert.push(summary(validator));
                    let diff = details_entry(&mut details, &validator.account_id);
                    diff.is_active = Some(now_active);
                    diff.active_next_session = Some(now_active);
                }
                // Rotated validators go to the back of the set.
                let moved: Vec<ValidatorDetails> = [demoted.max(promoted), demoted.min(promoted)]
                    .into_iter()
                    .map(|i| self.validators.remove(i))
                    .collect();
                self.validators.extend(moved.into_iter().rev());
            }
        }

        Tick {
            markers: self.markers(),
            network: network_diff(&before, &self.network_status()),
            active,
            inactive,
            details,
        }
    }
}

fn details_entry<'a>(
    details: &'a mut Vec<(AccountId, ValidatorDetailsDiff)>,
    account_id: &AccountId,
) -> &'a mut ValidatorDetailsDiff {
    let index = match details.iter().position(|(id, _)| id == account_id) {
        Some(index) => index,
        None => {
            details.push((account_id.clone(), ValidatorDetailsDiff::default()));
            details.len() - 1
        }
    };
    &mut details[index].1
}

fn block_hash(number: u64) -> String {
    format!("0x{:016x}", number.wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

fn validator(index: usize, active: bool) -> ValidatorDetails {
    let nominations = (0..index % 4 + 1)
        .map(|n| Nomination {
            stash_account_id: AccountId::new(format!("nominator-{index:02}-{n}")),
            submission_era_index: 2,
            target_count: 16,
            stake: Balance(500 * UNIT),
        })
        .collect::<Vec<_>>();
    let self_stake = Balance((index as u128 + 1) * 1_000 * UNIT);
    let nominated: u128 = nominations.iter().map(|n| n.stake.0).sum();

    ValidatorDetails {
        controller_account_id: Some(AccountId::new(format!("controller-{index:02}"))),
        display: Some(format!("VALIDATOR-{index:02}")),
        parent_display: (index % 3 == 0).then(|| "MOCK".to_string()),
        preferences: ValidatorPreferences {
            commission_per_billion: (index as u32 % 5) * 10_000_000,
            blocks_nominations: index % 7 == 6,
        },
        self_stake,
        total_stake: Balance(self_stake.0 + nominated),
        active_stake: active.then_some(Balance(self_stake.0 + nominated)),
        nominations,
        reward_destination: Some("Staked".to_string()),
        is_active: active,
        active_next_session: active,
        is_para_validator: active && index % 2 == 0,
        heartbeat_received: Some(true),
        blocks_authored: Some(0),
        reward_points: Some(0),
        return_rate_per_billion: Some(145_000_000),
        ..ValidatorDetails::new(AccountId::new(format!("validator-{index:02}")))
    }
}

fn summary(details: &ValidatorDetails) -> ValidatorSummary {
    ValidatorSummary {
        display: details.display.clone(),
        parent_display: details.parent_display.clone(),
        controller_account_id: details.controller_account_id.clone(),
        is_active: details.is_active,
        is_para_validator: details.is_para_validator,
        is_enrolled_in_1kv: details.is_enrolled_in_1kv,
        oversubscribed: details.oversubscribed,
        blocks_nominations: details.preferences.blocks_nominations,
        commission_per_billion: details.preferences.commission_per_billion,
        self_stake: details.self_stake,
        total_stake: Some(details.total_stake),
        nomination_count: details.nominations.len() as u32,
        heartbeat_received: details.heartbeat_received,
        slash_count: details.slash_count,
        blocks_authored: details.blocks_authored,
        reward_points: details.reward_points,
        ..ValidatorSummary::new(details.account_id.clone())
    }
}

fn network_diff(before: &NetworkStatus, after: &NetworkStatus) -> NetworkStatusDiff {
    let changed = |a: u64, b: u64| (a != b).then_some(b);
    let changed_stake = |a: Balance, b: Balance| (a != b).then_some(b);
    NetworkStatusDiff {
        best_block_number: Some(after.best_block_number),
        best_block_hash: Some(after.best_block_hash.clone()),
        finalized_block_number: Some(after.finalized_block_number),
        finalized_block_hash: Some(after.finalized_block_hash.clone()),
        active_era: (before.active_era != after.active_era).then_some(after.active_era),
        current_epoch: changed(before.current_epoch, after.current_epoch),
        total_stake: changed_stake(before.total_stake, after.total_stake),
        min_stake: changed_stake(before.min_stake, after.min_stake),
        max_stake: changed_stake(before.max_stake, after.max_stake),
        average_stake: changed_stake(before.average_stake, after.average_stake),
        median_stake: changed_stake(before.median_stake, after.median_stake),
        ..NetworkStatusDiff::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subvt_core::Feed;
    use subvt_feeds::{NetworkStatusFeed, ValidatorDetailsFeed, ValidatorListFeed};

    #[test]
    fn ticks_merge_into_fresh_snapshots() {
        let mut chain = Chain::new(8, 5);
        let mut network = chain.network_status();
        let mut active = chain.validator_list(ValidatorListKind::Active);
        let mut inactive = chain.validator_list(ValidatorListKind::Inactive);
        let watched = AccountId::from("validator-01");
        let mut details = chain.validator_details(&watched).unwrap();

        for _ in 0..2 * ROTATION_PERIOD {
            let tick = chain.tick();
            network = NetworkStatusFeed.merge(&network, &tick.network);
            active = ValidatorListFeed.merge(&active, &tick.active);
            inactive = ValidatorListFeed.merge(&inactive, &tick.inactive);
            if let Some(diff) = tick.validator_details(&watched) {
                details = ValidatorDetailsFeed.merge(&details, diff);
            }
        }

        assert_eq!(network, chain.network_status());
        assert_eq!(active.len(), 5);
        assert_eq!(inactive.len(), 3);
        let sorted = |mut list: ValidatorList| {
            list.validators.sort_by(|a, b| a.account_id.cmp(&b.account_id));
            list
        };
        assert_eq!(
            sorted(active),
            sorted(chain.validator_list(ValidatorListKind::Active))
        );
        assert_eq!(
            sorted(inactive),
            sorted(chain.validator_list(ValidatorListKind::Inactive))
        );
        assert_eq!(details, chain.validator_details(&watched).unwrap());
    }

    #[test]
    fn rotation_swaps_one_pair() {
        let mut chain = Chain::new(4, 2);
        let tick = loop {
            let tick = chain.tick();
            if !tick.active.remove_ids.is_empty() {
                break tick;
            }
        };
        assert_eq!(tick.active.remove_ids.len(), 1);
        assert_eq!(tick.active.insert.len(), 1);
        assert_eq!(tick.inactive.remove_ids, vec![tick.active.insert[0].account_id.clone()]);
        assert_eq!(tick.inactive.insert[0].account_id, tick.active.remove_ids[0]);
        assert!(!tick.inactive.insert[0].is_active);
    }
}
