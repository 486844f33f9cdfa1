//! Stream supervisor.
//!
//! Owns the set of live user-data streams and applies reconciler
//! events to it: additions start a stream, removals stop one, and
//! Telegram-group rewrites mutate the live stream in place. The set is
//! single-owner; the reconciler talks to it only through the host
//! queue.

use std::sync::Arc;

use tracing::{error, info};

use crate::models::{Account, AccountChange, StreamEvent};
use crate::pipeline::EventQueue;
use crate::stream::{StreamHandle, UserStream};

/// Manager of the live user-stream fleet.
pub struct Supervisor {
    streams: Vec<StreamHandle>,
    events: Arc<EventQueue<StreamEvent>>,
    http: reqwest::Client,
    tls_config: Arc<rustls::ClientConfig>,
}

impl Supervisor {
    pub fn new(
        events: Arc<EventQueue<StreamEvent>>,
        http: reqwest::Client,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> Self {
        Self {
            streams: Vec::new(),
            events,
            http,
            tls_config,
        }
    }

    /// Starts one stream per stored account. Invoked once at startup
    /// before the reconciler begins emitting changes.
    pub fn start_initial(&mut self, accounts: Vec<Account>) {
        for account in accounts {
            self.start_stream(account);
        }
    }

    /// Consumes the host queue forever, applying each event.
    pub async fn run(mut self, host_events: Arc<EventQueue<Account>>) {
        loop {
            let account = host_events.get().await;
            self.apply(account);
        }
    }

    /// Applies one reconciler event to the stream set.
    fn apply(&mut self, account: Account) {
        match account.change {
            AccountChange::None => self.start_stream(account),
            AccountChange::Removed => {
                match self.streams.iter().position(|h| h.account() == &account) {
                    Some(index) => {
                        let handle = self.streams.remove(index);
                        handle.stop();
                        info!(account = %account.alias, "Stopped stream for removed account");
                    }
                    None => {
                        error!(account = %account.alias, "No stream found for removed account");
                    }
                }
            }
            AccountChange::TgChanged => {
                match self.streams.iter().find(|h| h.account() == &account) {
                    Some(handle) => {
                        handle.set_tg_group(&account.tg_group);
                        info!(
                            account = %account.alias,
                            tg_group = %account.tg_group,
                            "Rewrote Telegram group on live stream"
                        );
                    }
                    None => {
                        error!(account = %account.alias, "No stream found for group rewrite");
                    }
                }
            }
        }
    }

    fn start_stream(&mut self, account: Account) {
        info!(account = %account.alias, "Starting user stream");
        self.streams.push(UserStream::spawn(
            account,
            Arc::clone(&self.events),
            self.http.clone(),
            Arc::clone(&self.tls_config),
        ));
    }

    /// Number of streams currently owned.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EventQueue;

    fn test_supervisor() -> Supervisor {
        Supervisor::new(
            Arc::new(EventQueue::new(16)),
            reqwest::Client::new(),
            Arc::new(crate::tls::build_tls_config()),
        )
    }

    fn account(alias: &str, tg_group: &str, change: AccountChange) -> Account {
        let mut account = Account::new(alias, "key", "secret", tg_group);
        account.change = change;
        account
    }

    #[tokio::test]
    async fn add_then_remove_round_trips() {
        let mut supervisor = test_supervisor();

        supervisor.apply(account("a", "g1", AccountChange::None));
        assert_eq!(supervisor.stream_count(), 1);

        supervisor.apply(account("a", "g1", AccountChange::Removed));
        assert_eq!(supervisor.stream_count(), 0);
    }

    #[tokio::test]
    async fn group_rewrite_keeps_the_stream() {
        let mut supervisor = test_supervisor();

        supervisor.apply(account("a", "g1", AccountChange::None));
        supervisor.apply(account("a", "g2", AccountChange::TgChanged));
        assert_eq!(supervisor.stream_count(), 1);
    }

    #[tokio::test]
    async fn removal_of_unknown_account_is_harmless() {
        let mut supervisor = test_supervisor();
        supervisor.apply(account("ghost", "g1", AccountChange::Removed));
        assert_eq!(supervisor.stream_count(), 0);
    }
}
