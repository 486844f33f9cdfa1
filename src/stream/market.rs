//! Market-wide mini-ticker stream.
//!
//! One long-lived connection to the `!miniTicker@arr` fan-out keeps
//! the shared [`PriceTable`] current. Before subscribing, a REST
//! snapshot seeds the known-symbol set so lookups do not have to wait
//! for the first push of every symbol.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use tungstenite::Message;

use crate::models::{MiniTicker, SymbolPrice};
use crate::prices::{PriceTable, Ticker};
use crate::{MinderError, Result};

const TICKER_SNAPSHOT_URL: &str = "https://api.binance.com/api/v3/ticker/price";
const MINI_TICKER_URL: &str = "wss://stream.binance.com:9443/ws/!miniTicker@arr";

/// The fan-out pushes roughly once per second; a silent connection is
/// dead well before this.
const IDLE_TIMEOUT: Duration = Duration::from_secs(20);

/// Client for the public mini-ticker stream.
pub struct MarketStream {
    prices: Arc<PriceTable>,
    http: reqwest::Client,
    tls_config: Arc<rustls::ClientConfig>,
}

impl MarketStream {
    pub fn new(
        prices: Arc<PriceTable>,
        http: reqwest::Client,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> Self {
        Self {
            prices,
            http,
            tls_config,
        }
    }

    /// Runs the stream indefinitely, reconnecting with a full handshake
    /// after any read error or CLOSE frame.
    pub async fn run(self) {
        if let Err(e) = self.seed_symbols().await {
            error!(error = %e, "Failed to seed symbol snapshot");
        }

        loop {
            if let Err(e) = self.stream_once().await {
                error!(error = %e, "Market stream severed, reconnecting");
            }
        }
    }

    /// Fetches the REST price snapshot and seeds the price table.
    async fn seed_symbols(&self) -> Result<()> {
        let snapshot: Vec<SymbolPrice> = self
            .http
            .get(TICKER_SNAPSHOT_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total = snapshot.len();
        self.prices.seed(
            snapshot
                .into_iter()
                .filter_map(|entry| entry.price.parse().ok().map(|price| (entry.symbol, price))),
        );
        info!(symbols = total, "Seeded price table from REST snapshot");
        Ok(())
    }

    /// One connection cycle: handshake, then read until the stream dies.
    async fn stream_once(&self) -> Result<()> {
        let (mut write, mut read) = super::connect(MINI_TICKER_URL, self.tls_config.clone()).await?;
        info!("Mini-ticker stream connected");

        loop {
            let msg = tokio::time::timeout(IDLE_TIMEOUT, read.next())
                .await
                .map_err(|_| MinderError::Timeout("market stream idle"))?;

            match msg {
                Some(Ok(Message::Text(text))) => self.apply_frame(text.as_str()),
                Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(_))) => {
                    return Err(tungstenite::Error::ConnectionClosed.into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(tungstenite::Error::ConnectionClosed.into()),
            }
        }
    }

    /// Applies one pushed frame (a JSON array of mini-tickers) to the
    /// price table. Malformed frames are logged and dropped; the
    /// stream keeps reading.
    fn apply_frame(&self, text: &str) {
        let tickers: Vec<MiniTicker> = match serde_json::from_str(text) {
            Ok(tickers) => tickers,
            Err(e) => {
                error!(error = %e, "Undecodable mini-ticker frame");
                return;
            }
        };

        for ticker in tickers {
            match (ticker.close.parse::<f64>(), ticker.open.parse::<f64>()) {
                (Ok(last), Ok(open_24h)) => {
                    self.prices.put(&ticker.symbol, Ticker { last, open_24h });
                }
                _ => warn!(symbol = %ticker.symbol, "Unparsable ticker prices"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stream() -> MarketStream {
        MarketStream::new(
            Arc::new(PriceTable::new()),
            reqwest::Client::new(),
            Arc::new(crate::tls::build_tls_config()),
        )
    }

    #[test]
    fn frame_updates_price_table() {
        let stream = test_stream();
        stream.apply_frame(r#"[{"s":"BTCUSDT","c":"100.0","o":"80.0"}]"#);

        let ticker = stream.prices.get("BTCUSDT").unwrap();
        assert_eq!(ticker.last, 100.0);
        assert_eq!(ticker.open_24h, 80.0);
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let stream = test_stream();
        stream.apply_frame("{not json");
        stream.apply_frame(r#"[{"s":"ETHUSDT","c":"nope","o":"1.0"}]"#);
        assert!(stream.prices.is_empty());
    }
}
