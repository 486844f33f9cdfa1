//! Process-wide price table.
//!
//! One writer (the market ticker stream) keeps the table current;
//! schedulers and the control plane read it concurrently. Entries are
//! whole [`Ticker`] values behind an RW-lock, so a reader always sees
//! a consistent `{last, open_24h}` pair.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Latest known state of one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticker {
    /// Last traded price.
    pub last: f64,
    /// Price 24 hours ago. Zero until the first stream push arrives;
    /// readers must not divide by it without checking.
    pub open_24h: f64,
}

/// Shared mapping `symbol -> ticker`. Symbols are stored uppercase and
/// never removed; the table is rebuilt from scratch on restart.
#[derive(Debug, Default)]
pub struct PriceTable {
    inner: RwLock<HashMap<String, Ticker>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the ticker for `symbol`.
    pub fn put(&self, symbol: &str, ticker: Ticker) {
        self.inner
            .write()
            .insert(symbol.to_ascii_uppercase(), ticker);
    }

    /// Returns a snapshot of the ticker for `symbol`, or `None` when
    /// the symbol has not been seen yet.
    pub fn get(&self, symbol: &str) -> Option<Ticker> {
        self.inner.read().get(symbol).copied()
    }

    /// Seeds the table from the REST snapshot taken before the stream
    /// subscription. Symbols already pushed by the stream are left
    /// untouched so a seed never overwrites fresher data.
    pub fn seed(&self, symbols: impl IntoIterator<Item = (String, f64)>) {
        let mut table = self.inner.write();
        for (symbol, last) in symbols {
            table
                .entry(symbol.to_ascii_uppercase())
                .or_insert(Ticker { last, open_24h: 0.0 });
        }
    }

    /// Copies the whole table, for control-plane price listings.
    pub fn snapshot(&self) -> HashMap<String, Ticker> {
        self.inner.read().clone()
    }

    /// Number of symbols currently known.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
