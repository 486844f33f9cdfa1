//! Market ticker wire models.

use serde::{Deserialize, Serialize};

/// One element of a `!miniTicker@arr` frame. Prices arrive as decimal
/// strings; unused fields of the push are ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MiniTicker {
    /// Symbol, e.g. `BTCUSDT`.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Close (latest) price.
    #[serde(rename = "c")]
    pub close: String,
    /// Open price 24 hours ago.
    #[serde(rename = "o")]
    pub open: String,
}

/// One element of the `GET /api/v3/ticker/price` snapshot used to seed
/// the known-symbol set before subscribing to the stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SymbolPrice {
    pub symbol: String,
    pub price: String,
}
