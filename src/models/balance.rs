//! Balance-update models.

use serde::{Deserialize, Serialize};

use crate::util::format_epoch_ms;

/// Wire shape of a `balanceUpdate` push: a deposit, withdrawal or
/// transfer changed one asset's balance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalanceUpdate {
    /// Asset, e.g. `BTC`.
    #[serde(rename = "a")]
    pub asset: String,
    /// Balance delta as a decimal string.
    #[serde(rename = "d")]
    pub delta: String,
    /// Event time, ms epoch.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Clear time, ms epoch.
    #[serde(rename = "T")]
    pub clear_time: i64,
}

/// A normalized balance event.
#[derive(Debug, Clone)]
pub struct BalanceEvent {
    pub instrument: String,
    pub balance: String,
    pub event_time: String,
    pub clear_time: String,
    pub for_alias: String,
    pub tg_group: String,
}

impl BalanceEvent {
    pub fn from_update(update: BalanceUpdate, alias: &str, tg_group: &str) -> Self {
        Self {
            instrument: update.asset,
            balance: update.delta,
            event_time: format_epoch_ms(update.event_time).unwrap_or_default(),
            clear_time: format_epoch_ms(update.clear_time).unwrap_or_default(),
            for_alias: alias.to_string(),
            tg_group: tg_group.to_string(),
        }
    }
}
