//! Shared chain value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validator or nominator account, as the backend spells it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An amount in the chain's smallest unit.
///
/// Carried as a decimal string on the wire since it does not fit 64 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Balance(pub u128);

impl Balance {
    /// Largest number of token decimals a `u128` amount can be scaled by.
    pub const MAX_DECIMALS: u32 = 38;

    /// Render in whole tokens with `decimals` fractional digits, trailing zeros trimmed.
    ///
    /// Falls back to the raw amount when `decimals` exceeds [`Self::MAX_DECIMALS`].
    pub fn display_units(&self, decimals: u32, ticker: &str) -> String {
        let Some(scale) = 10u128.checked_pow(decimals) else {
            return format!("{} {ticker}", self.0);
        };
        let whole = self.0 / scale;
        let fraction = self.0 % scale;
        if fraction == 0 {
            return format!("{whole} {ticker}");
        }
        let fraction = format!("{fraction:0width$}", width = decimals as usize);
        format!("{whole}.{} {ticker}", fraction.trim_end_matches('0'))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Balance {
    type Err = BalanceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse()
            .map(Self)
            .map_err(|_| BalanceParseError(s.to_string()))
    }
}

impl TryFrom<String> for Balance {
    type Error = BalanceParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Balance> for String {
    fn from(balance: Balance) -> Self {
        balance.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid balance: {0}")]
pub struct BalanceParseError(String);
