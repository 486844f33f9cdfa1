//! Account reconciler.
//!
//! Polls the authoritative `hosts` table on a fixed cadence and diffs
//! it against the previously observed set. Additions, removals and
//! Telegram-group rewrites are emitted into the host queue for the
//! supervisor to apply. Polling is the contract here; the table is
//! written by an external control plane.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::db::Database;
use crate::models::{Account, AccountChange};
use crate::pipeline::EventQueue;

/// The reconciliation cadence. Part of the operator-visible contract:
/// an account added to the table is streaming within one tick.
const POLL_PERIOD: Duration = Duration::from_secs(10);

/// Runs the reconciliation loop forever. Fetch failures are logged and
/// retried on the next tick; the cached set is left untouched so no
/// spurious removals are emitted.
pub async fn run(db: Arc<Database>, host_events: Arc<EventQueue<Account>>) {
    let mut previous = match db.fetch_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => {
            error!(error = %e, "Initial host fetch failed");
            Vec::new()
        }
    };

    loop {
        tokio::time::sleep(POLL_PERIOD).await;

        let current = match db.fetch_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Host fetch failed, skipping tick");
                continue;
            }
        };

        for event in diff(&mut previous, &current) {
            host_events.append(event).await;
        }
    }
}

/// Diffs the freshly fetched account set against the cached one,
/// updating the cache in place and returning the change events in
/// table order: additions and rewrites first, then removals.
///
/// Accounts are matched by immutable identity, so a changed Telegram
/// group surfaces as a rewrite on the existing entry rather than a
/// restart.
pub fn diff(previous: &mut Vec<Account>, current: &[Account]) -> Vec<Account> {
    let mut events = Vec::new();

    for account in current {
        match previous.iter_mut().find(|known| *known == account) {
            None => {
                previous.push(account.clone());
                let mut added = account.clone();
                added.change = AccountChange::None;
                events.push(added);
            }
            Some(known) => {
                if known.tg_group != account.tg_group || known.alias != account.alias {
                    known.tg_group = account.tg_group.clone();
                    known.alias = account.alias.clone();
                    let mut changed = account.clone();
                    changed.change = AccountChange::TgChanged;
                    events.push(changed);
                }
            }
        }
    }

    previous.retain(|known| {
        if current.iter().any(|account| account == known) {
            true
        } else {
            let mut removed = known.clone();
            removed.change = AccountChange::Removed;
            events.push(removed);
            false
        }
    });

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(alias: &str, tg_group: &str) -> Account {
        Account::new(alias, &format!("{alias}-key"), &format!("{alias}-secret"), tg_group)
    }

    #[test]
    fn new_account_is_emitted_as_addition() {
        let mut previous = Vec::new();
        let current = vec![account("a", "g1")];

        let events = diff(&mut previous, &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change, AccountChange::None);
        assert_eq!(previous.len(), 1);
    }

    #[test]
    fn unchanged_set_emits_nothing() {
        let mut previous = vec![account("a", "g1")];
        let current = vec![account("a", "g1")];

        assert!(diff(&mut previous, &current).is_empty());
        assert_eq!(previous.len(), 1);
    }

    #[test]
    fn replaced_account_is_removed_then_added() {
        let mut previous = vec![account("a", "g1")];
        let current = vec![account("b", "g1")];

        let events = diff(&mut previous, &current);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].alias, "b");
        assert_eq!(events[0].change, AccountChange::None);
        assert_eq!(events[1].alias, "a");
        assert_eq!(events[1].change, AccountChange::Removed);
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].alias, "b");
    }

    #[test]
    fn tg_group_change_is_a_rewrite_not_a_restart() {
        let mut previous = vec![account("a", "g1")];
        let current = vec![account("a", "g2")];

        let events = diff(&mut previous, &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change, AccountChange::TgChanged);
        assert_eq!(events[0].tg_group, "g2");
        // cache carries the new group so the rewrite fires only once
        assert_eq!(previous[0].tg_group, "g2");
        assert!(diff(&mut previous, &current).is_empty());
    }

    #[test]
    fn removal_only_fires_once() {
        let mut previous = vec![account("a", "g1")];
        let events = diff(&mut previous, &[]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change, AccountChange::Removed);
        assert!(previous.is_empty());
        assert!(diff(&mut previous, &[]).is_empty());
    }
}
