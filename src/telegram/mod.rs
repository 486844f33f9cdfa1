//! Telegram notification path.
//!
//! This module is organized by concern:
//! - payload formatting for each event kind (URL-safe, `%0A` newlines)
//! - [`resolver`] - chat-name to chat-id resolution via the bot feed
//! - [`sender`] - the pool of outbound message senders
//!
//! Messages are sent before the matching row is persisted, so the chat
//! sees an event even when the insert later fails.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::db::Database;
use crate::models::{AccountPositionEvent, BalanceEvent, OrderEvent, StreamEvent};

pub mod resolver;
pub mod sender;

pub use sender::{Payload, Sender};

/// Cached `chat name -> chat id` mappings. Read by the notifier,
/// written by resolver refreshes.
#[derive(Debug, Default)]
pub struct ChatIdCache {
    inner: Mutex<HashMap<String, String>>,
}

impl ChatIdCache {
    pub fn from_map(ids: HashMap<String, String>) -> Self {
        Self {
            inner: Mutex::new(ids),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<String> {
        self.inner.lock().get(name).cloned()
    }

    pub fn extend(&self, ids: HashMap<String, String>) {
        self.inner.lock().extend(ids);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Formats the payload for any stream event.
pub fn payload_for(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Order(order) => order_payload(order),
        StreamEvent::Balance(balance) => balance_payload(balance),
        StreamEvent::AccountPosition(position) => position_payload(position),
    }
}

/// Formats an order event. `%0A` is the newline character, `%20` the
/// space; the fee line appears only when a commission asset is known.
pub fn order_payload(order: &OrderEvent) -> String {
    let mut payload = String::from("Exchange: Binance%0A");
    payload.push_str(&format!("OrderID: {}%0A", order.order_id));
    payload.push_str(&format!("Token: {}%0A", order.instrument));
    payload.push_str(&format!("Price: {}%0A", order.order_price));
    payload.push_str(&format!("Qty: {}%0A", order.quantity));
    payload.push_str(&format!("LastFilled: {}%0A", order.last_filled_quantity));
    payload.push_str(&format!("Side: {}%0A", order.order_side));
    payload.push_str(&format!("Type: {}%0A", order.order_type));
    if !order.commission_asset.is_empty() {
        payload.push_str(&format!(
            "Fee: {} ( {} )%0A",
            order.commission_amount, order.commission_asset
        ));
    }
    payload.push_str(&format!("ExeType: {}%0A", order.execution_type));
    payload.push_str(&format!("State: {}%0A", order.order_status));
    payload.push_str(&format!("CreatedTime: {}%0A", order.created_time));
    payload.push_str(&format!("TransactionTime: {}%0A", order.transaction_time));

    payload.replace(' ', "%20")
}

/// Formats a balance event.
pub fn balance_payload(balance: &BalanceEvent) -> String {
    let mut payload = String::from("Exchange: Binance%0A");
    payload.push_str("Type: BalanceUpdate%0A");
    payload.push_str(&format!("Token: {}%0A", balance.instrument));
    payload.push_str(&format!("Time: {}%0A", balance.clear_time));
    payload.push_str(&format!("Balance: {}%0A", balance.balance));

    payload.replace(' ', "%20")
}

/// Formats an account-position event.
pub fn position_payload(position: &AccountPositionEvent) -> String {
    let mut payload = String::from("Exchange: Binance%0A");
    payload.push_str("Type: AccountUpdate%0A");
    payload.push_str(&format!("Token: {}%0A", position.instrument));
    payload.push_str(&format!("Free: {}%0A", position.free));
    payload.push_str(&format!("Locked: {}%0A", position.locked));
    payload.push_str(&format!("EventTime: {}%0A", position.event_time));
    payload.push_str(&format!("LastUpdateTime: {}%0A", position.last_update_time));

    payload.replace(' ', "%20")
}

/// Resolves chat names and hands payloads to the sender pool.
pub struct Notifier {
    senders: Vec<Sender>,
    cache: ChatIdCache,
    http: reqwest::Client,
    bot_token: String,
    tls_config: Arc<rustls::ClientConfig>,
    db: Arc<Database>,
}

/// Pool-trimming threshold: completed senders are evicted only once
/// the pool has grown past this.
const POOL_TRIM_SIZE: usize = 3;

impl Notifier {
    /// Builds the notifier, priming the chat-id cache from the
    /// database and one resolver pass.
    pub async fn new(
        db: Arc<Database>,
        http: reqwest::Client,
        tls_config: Arc<rustls::ClientConfig>,
        bot_token: String,
    ) -> Self {
        if let Err(e) = db.create_chat_id_table().await {
            error!(error = %e, "Cannot create chat-id table");
        }
        let cached = match db.fetch_chat_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Cannot load cached chat ids");
                HashMap::new()
            }
        };

        let notifier = Self {
            senders: Vec::new(),
            cache: ChatIdCache::from_map(cached),
            http,
            bot_token,
            tls_config,
            db,
        };
        notifier.refresh().await;
        notifier
    }

    /// Sends `text` to the chat registered under `tg_group`. Unknown
    /// names trigger one resolver refresh; a persistent miss drops the
    /// message with a log line.
    pub async fn notify(&mut self, text: String, tg_group: &str) {
        let chat_id = match self.cache.lookup(tg_group) {
            Some(id) => id,
            None => {
                self.refresh().await;
                match self.cache.lookup(tg_group) {
                    Some(id) => id,
                    None => {
                        error!(chat = %tg_group, "Chat not found, dropping message");
                        return;
                    }
                }
            }
        };

        self.dispatch(Payload { text, chat_id });
    }

    /// Pulls the bot update feed, merging new mappings into the cache
    /// and persisting them.
    async fn refresh(&self) {
        match resolver::fetch_updates(&self.http, &self.bot_token).await {
            Ok(ids) => {
                if let Err(e) = self.db.upsert_chat_ids(&ids).await {
                    error!(error = %e, "Cannot persist chat ids");
                }
                self.cache.extend(ids);
            }
            Err(e) => error!(error = %e, "Bot update fetch failed"),
        }
    }

    /// Pool dispatch: first available sender wins; otherwise the pool
    /// is trimmed of completed senders (when large enough) and a new
    /// sender is started with the payload.
    fn dispatch(&mut self, payload: Payload) {
        if let Some(sender) = self.senders.iter().find(|s| s.available()) {
            sender.push(payload);
            return;
        }

        if self.senders.len() > POOL_TRIM_SIZE {
            self.senders.retain(|s| !s.completed());
        }

        self.senders.push(Sender::spawn(
            Arc::clone(&self.tls_config),
            self.bot_token.clone(),
            payload,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_event() -> OrderEvent {
        OrderEvent {
            instrument: "ETHBTC".into(),
            order_side: "BUY".into(),
            order_type: "LIMIT".into(),
            time_in_force: "GTC".into(),
            quantity: "1.0".into(),
            order_price: "0.1".into(),
            stop_price: "0.0".into(),
            execution_type: "NEW".into(),
            order_status: "NEW".into(),
            reject_reason: "NONE".into(),
            order_id: "42".into(),
            last_filled_quantity: "0.0".into(),
            cumulative_filled_quantity: "0.0".into(),
            last_executed_price: "0.0".into(),
            commission_amount: "0".into(),
            commission_asset: String::new(),
            trade_id: "-1".into(),
            event_time: "2017-07-07 05:34:18".into(),
            transaction_time: "2017-07-07 05:34:18".into(),
            created_time: "2017-07-07 05:34:18".into(),
            for_alias: "main".into(),
            tg_group: "g1".into(),
        }
    }

    #[test]
    fn order_payload_starts_with_exchange_banner() {
        let payload = order_payload(&order_event());
        assert!(payload.starts_with("Exchange:%20Binance%0A"));
        assert!(payload.contains("OrderID:%2042%0A"));
        assert!(payload.contains("Token:%20ETHBTC%0A"));
    }

    #[test]
    fn order_payload_has_no_raw_spaces_or_newlines() {
        let payload = order_payload(&order_event());
        assert!(!payload.contains(' '));
        assert!(!payload.contains('\n'));
    }

    #[test]
    fn fee_line_only_when_asset_known() {
        let mut order = order_event();
        assert!(!order_payload(&order).contains("Fee:"));

        order.commission_asset = "BNB".into();
        order.commission_amount = "0.005".into();
        let payload = order_payload(&order);
        assert!(payload.contains("Fee:%200.005%20(%20BNB%20)%0A"));
    }

    #[test]
    fn balance_payload_shape() {
        let balance = BalanceEvent {
            instrument: "BTC".into(),
            balance: "100.0".into(),
            event_time: "2019-11-08 08:11:37".into(),
            clear_time: "2019-11-08 08:11:37".into(),
            for_alias: "main".into(),
            tg_group: "g1".into(),
        };
        let payload = balance_payload(&balance);
        assert!(payload.starts_with("Exchange:%20Binance%0A"));
        assert!(payload.contains("Type:%20BalanceUpdate%0A"));
        assert!(payload.contains("Balance:%20100.0%0A"));
    }

    #[test]
    fn cache_lookup_and_extend() {
        let cache = ChatIdCache::default();
        assert!(cache.lookup("ops").is_none());

        cache.extend(HashMap::from([("ops".to_string(), "-100123".to_string())]));
        assert_eq!(cache.lookup("ops").as_deref(), Some("-100123"));
        assert_eq!(cache.len(), 1);
    }
}
