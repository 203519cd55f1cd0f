//! One-line text renderings of feed snapshots.

use subvt_client::BlockMarkers;
use subvt_feeds::{Balance, NetworkStatus, ValidatorDetails, ValidatorList};

/// How balances of a network are displayed.
#[derive(Debug, Clone)]
pub struct Token {
    pub ticker: String,
    pub decimals: u32,
}

impl Token {
    pub fn format(&self, balance: Balance) -> String {
        balance.display_units(self.decimals, &self.ticker)
    }
}

fn markers(markers: &BlockMarkers) -> String {
    let show = |n: Option<u64>| n.map_or_else(|| "-".to_string(), |n| format!("#{n}"));
    format!(
        "best {} finalized {}",
        show(markers.best_block_number),
        show(markers.finalized_block_number)
    )
}

pub fn network_status(status: &NetworkStatus, token: &Token) -> String {
    format!(
        "#{} (finalized #{}) era {} epoch {} | {} active / {} inactive | total stake {} | avg {} | return {:.2}%",
        status.best_block_number,
        status.finalized_block_number,
        status.active_era,
        status.current_epoch,
        status.active_validator_count,
        status.inactive_validator_count,
        token.format(status.total_stake),
        token.format(status.average_stake),
        f64::from(status.return_rate_per_million) / 10_000.0,
    )
}

pub fn validator_list(list: &ValidatorList, token: &Token, at: &BlockMarkers) -> String {
    let stake = Balance(
        list.validators
            .iter()
            .filter_map(|v| v.total_stake)
            .map(|b| b.0)
            .sum(),
    );
    let para = list.validators.iter().filter(|v| v.is_para_validator).count();
    format!(
        "{} validators ({para} para) | stake {} | {}",
        list.len(),
        token.format(stake),
        markers(at)
    )
}

pub fn validator_details(details: &ValidatorDetails, token: &Token) -> String {
    let name = match (&details.parent_display, &details.display) {
        (Some(parent), Some(child)) => format!("{parent}/{child}"),
        (Some(name), None) | (None, Some(name)) => name.clone(),
        (None, None) => details.account_id.to_string(),
    };
    let state = if details.is_active { "active" } else { "waiting" };
    format!(
        "{name} [{state}] self {} | nominated {} by {} | commission {:.2}% | blocks {} | points {}",
        token.format(details.self_stake),
        token.format(details.nominated_stake()),
        details.nominations.len(),
        f64::from(details.preferences.commission_per_billion) / 10_000_000.0,
        details.blocks_authored.unwrap_or(0),
        details.reward_points.unwrap_or(0),
    )
}
