//! Order execution-report models.
//!
//! The exchange streams one `executionReport` per order status change.
//! Numeric quantities arrive as strings and are preserved verbatim,
//! including zero values and the reject reason.

use serde::{Deserialize, Serialize};

use crate::util::format_epoch_ms;

/// Wire shape of an `executionReport` push.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionReport {
    /// Symbol, e.g. `ETHBTC`.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Side: `BUY` or `SELL`.
    #[serde(rename = "S")]
    pub side: String,
    /// Order type, e.g. `LIMIT`.
    #[serde(rename = "o")]
    pub order_type: String,
    /// Time in force.
    #[serde(rename = "f")]
    pub time_in_force: String,
    /// Order quantity.
    #[serde(rename = "q")]
    pub quantity: String,
    /// Order price.
    #[serde(rename = "p")]
    pub price: String,
    /// Stop price.
    #[serde(rename = "P")]
    pub stop_price: String,
    /// Current execution type, e.g. `NEW`, `TRADE`.
    #[serde(rename = "x")]
    pub execution_type: String,
    /// Current order status, e.g. `FILLED`.
    #[serde(rename = "X")]
    pub order_status: String,
    /// Order reject reason, `NONE` when not rejected.
    #[serde(rename = "r")]
    pub reject_reason: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    /// Last executed quantity.
    #[serde(rename = "l")]
    pub last_filled_quantity: String,
    /// Cumulative filled quantity.
    #[serde(rename = "z")]
    pub cumulative_filled_quantity: String,
    /// Last executed price.
    #[serde(rename = "L")]
    pub last_executed_price: String,
    /// Commission amount.
    #[serde(rename = "n")]
    pub commission_amount: String,
    /// Commission asset; the feed is inconsistent about its type.
    #[serde(rename = "N", default)]
    pub commission_asset: Option<CommissionAsset>,
    #[serde(rename = "t")]
    pub trade_id: i64,
    /// Event time, ms epoch.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Transaction time, ms epoch.
    #[serde(rename = "T")]
    pub transaction_time: i64,
    /// Order creation time, ms epoch.
    #[serde(rename = "O")]
    pub created_time: i64,
}

/// The commission-asset field arrives as either a string or a number.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommissionAsset {
    Text(String),
    Number(f64),
}

impl CommissionAsset {
    /// Normalizes the polymorphic field to a string.
    pub fn into_string(self) -> String {
        match self {
            CommissionAsset::Text(s) => s,
            CommissionAsset::Number(n) => n.to_string(),
        }
    }
}

/// A fully normalized order event, ready for the sinks.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub instrument: String,
    pub order_side: String,
    pub order_type: String,
    pub time_in_force: String,
    pub quantity: String,
    pub order_price: String,
    pub stop_price: String,
    pub execution_type: String,
    pub order_status: String,
    pub reject_reason: String,
    pub order_id: String,
    pub last_filled_quantity: String,
    pub cumulative_filled_quantity: String,
    pub last_executed_price: String,
    pub commission_amount: String,
    /// Empty when the exchange omitted the field.
    pub commission_asset: String,
    pub trade_id: String,
    pub event_time: String,
    pub transaction_time: String,
    pub created_time: String,
    pub for_alias: String,
    pub tg_group: String,
}

impl OrderEvent {
    /// Builds the event from its wire form, stamping the producing
    /// account's alias and Telegram group.
    pub fn from_report(report: ExecutionReport, alias: &str, tg_group: &str) -> Self {
        Self {
            instrument: report.symbol,
            order_side: report.side,
            order_type: report.order_type,
            time_in_force: report.time_in_force,
            quantity: report.quantity,
            order_price: report.price,
            stop_price: report.stop_price,
            execution_type: report.execution_type,
            order_status: report.order_status,
            reject_reason: report.reject_reason,
            order_id: report.order_id.to_string(),
            last_filled_quantity: report.last_filled_quantity,
            cumulative_filled_quantity: report.cumulative_filled_quantity,
            last_executed_price: report.last_executed_price,
            commission_amount: report.commission_amount,
            commission_asset: report
                .commission_asset
                .map(CommissionAsset::into_string)
                .unwrap_or_default(),
            trade_id: report.trade_id.to_string(),
            event_time: format_epoch_ms(report.event_time).unwrap_or_default(),
            transaction_time: format_epoch_ms(report.transaction_time).unwrap_or_default(),
            created_time: format_epoch_ms(report.created_time).unwrap_or_default(),
            for_alias: alias.to_string(),
            tg_group: tg_group.to_string(),
        }
    }
}
