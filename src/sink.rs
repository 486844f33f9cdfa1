//! Persistence and notification consumer.
//!
//! The single consumer of the user-stream queue. Every event first goes
//! out as a chat message, then lands in its account's table; a failed
//! insert loses that one row and nothing else. Account-position events
//! are notified but not persisted.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use crate::db::Database;
use crate::models::StreamEvent;
use crate::pipeline::EventQueue;
use crate::telegram::{self, Notifier};
use crate::util::table_prefix;

/// Consumes the user-stream queue forever.
pub async fn run(
    events: Arc<EventQueue<StreamEvent>>,
    db: Arc<Database>,
    mut notifier: Notifier,
) {
    let mut prefixes: HashMap<String, String> = HashMap::new();

    loop {
        let event = events.get().await;

        let payload = telegram::payload_for(&event);
        notifier.notify(payload, event.tg_group()).await;

        let prefix = match prefixes.get(event.for_alias()) {
            Some(prefix) => prefix.clone(),
            None => {
                // first sight of this alias: derive the prefix and make
                // sure its tables exist
                let prefix = table_prefix(event.for_alias());
                if let Err(e) = db.create_event_tables(&prefix).await {
                    error!(error = %e, alias = %event.for_alias(), "Cannot create event tables");
                }
                prefixes.insert(event.for_alias().to_string(), prefix.clone());
                prefix
            }
        };

        match &event {
            StreamEvent::Order(order) => {
                if let Err(e) = db.insert_order(&prefix, order).await {
                    error!(error = %e, "Dropped order row");
                }
            }
            StreamEvent::Balance(balance) => {
                if let Err(e) = db.insert_balance(&prefix, balance).await {
                    error!(error = %e, "Dropped balance row");
                }
            }
            StreamEvent::AccountPosition(_) => {}
        }
    }
}
