//! Account-position models.
//!
//! An `outboundAccountPosition` push carries the balances of every
//! asset that changed; it fans out into one event per asset, delivered
//! to the pipeline as a single atomic batch so consumers observe the
//! account snapshot whole.

use serde::{Deserialize, Serialize};

use crate::util::format_epoch_ms;

/// Wire shape of an `outboundAccountPosition` push.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountPosition {
    /// Event time, ms epoch.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Time of the last account update, ms epoch.
    #[serde(rename = "u")]
    pub last_update_time: i64,
    /// Changed balances.
    #[serde(rename = "B")]
    pub balances: Vec<AssetBalance>,
}

/// One asset entry inside the `B` array.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetBalance {
    #[serde(rename = "a")]
    pub asset: String,
    /// Freely available amount.
    #[serde(rename = "f")]
    pub free: String,
    /// Locked amount.
    #[serde(rename = "l")]
    pub locked: String,
}

/// A normalized per-asset position event.
#[derive(Debug, Clone)]
pub struct AccountPositionEvent {
    pub instrument: String,
    pub free: String,
    pub locked: String,
    pub event_time: String,
    pub last_update_time: String,
    pub for_alias: String,
    pub tg_group: String,
}

impl AccountPositionEvent {
    /// Fans a position push out into one event per asset.
    pub fn from_position(position: AccountPosition, alias: &str, tg_group: &str) -> Vec<Self> {
        let event_time = format_epoch_ms(position.event_time).unwrap_or_default();
        let last_update_time = format_epoch_ms(position.last_update_time).unwrap_or_default();

        position
            .balances
            .into_iter()
            .map(|balance| Self {
                instrument: balance.asset,
                free: balance.free,
                locked: balance.locked,
                event_time: event_time.clone(),
                last_update_time: last_update_time.clone(),
                for_alias: alias.to_string(),
                tg_group: tg_group.to_string(),
            })
            .collect()
    }
}
