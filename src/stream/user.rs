//! Per-account user-data stream.
//!
//! Each monitored account owns one [`UserStream`]: a state machine that
//! acquires a listen key over REST, opens the authenticated WebSocket,
//! decodes execution/balance/position events, and recovers from any
//! failure with a fixed backoff and a brand-new listen-key cycle.
//!
//! The listen-key keepalive timer is armed while the stream is open and
//! lives inside the stream's own task, so it is torn down with the
//! connection and can never outlive the stream that spawned it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{error, info};
use tungstenite::Message;

use crate::listen_key;
use crate::models::balance::BalanceUpdate;
use crate::models::order::ExecutionReport;
use crate::models::position::AccountPosition;
use crate::models::{
    Account, AccountPositionEvent, BalanceEvent, OrderEvent, StreamEvent,
};
use crate::pipeline::EventQueue;
use crate::{MinderError, Result};

const USER_STREAM_URL_BASE: &str = "wss://stream.binance.com:9443/ws";

/// Fixed pause before a fresh listen-key cycle after any failure.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// Listen keys expire 60 minutes after their last touch; refresh at
/// half that. Each fire is anchored to the previous one, not to the
/// refresh round-trip.
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30 * 60);

/// The exchange pings every few minutes; a user stream silent for this
/// long is gone.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Supervisor-side handle to a running [`UserStream`].
pub struct StreamHandle {
    account: Account,
    tg_group: Arc<RwLock<String>>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// The immutable identity this stream was started for.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Requests termination. Idempotent; the stream closes its socket
    /// and exits without reconnecting.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Rewrites the Telegram group label stamped on future events.
    pub fn set_tg_group(&self, tg_group: &str) {
        *self.tg_group.write() = tg_group.to_string();
    }

    /// Whether the underlying task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// The per-account stream state machine.
pub struct UserStream {
    alias: String,
    api_key: String,
    tg_group: Arc<RwLock<String>>,
    events: Arc<EventQueue<StreamEvent>>,
    http: reqwest::Client,
    tls_config: Arc<rustls::ClientConfig>,
    stop_rx: watch::Receiver<bool>,
}

impl UserStream {
    /// Spawns a stream for `account` and returns the supervisor handle.
    pub fn spawn(
        account: Account,
        events: Arc<EventQueue<StreamEvent>>,
        http: reqwest::Client,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> StreamHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let tg_group = Arc::new(RwLock::new(account.tg_group.clone()));

        let stream = UserStream {
            alias: account.alias.clone(),
            api_key: account.api_key.clone(),
            tg_group: Arc::clone(&tg_group),
            events,
            http,
            tls_config,
            stop_rx,
        };
        let task = tokio::spawn(stream.run());

        StreamHandle {
            account,
            tg_group,
            stop_tx,
            task,
        }
    }

    /// Runs connection cycles until stopped. Every failure logs and
    /// backs off before starting over from the listen-key request.
    async fn run(mut self) {
        loop {
            if *self.stop_rx.borrow() {
                return;
            }

            match self.stream_once().await {
                Ok(()) => {
                    info!(account = %self.alias, "User stream stopped");
                    return;
                }
                Err(e) => error!(account = %self.alias, error = %e, "User stream severed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                _ = self.stop_rx.changed() => return,
            }
        }
    }

    /// One full cycle: listen key, WebSocket handshake, then read until
    /// the connection dies or a stop is requested. `Ok` means a clean
    /// stop; any `Err` is followed by a fresh cycle.
    async fn stream_once(&mut self) -> Result<()> {
        let listen_key = listen_key::create(&self.http, &self.api_key).await?;
        let url = format!("{USER_STREAM_URL_BASE}/{listen_key}");
        let (mut write, mut read) = super::connect(&url, self.tls_config.clone()).await?;
        info!(account = %self.alias, "User-data stream connected");

        let mut keepalive = interval_at(Instant::now() + KEEPALIVE_PERIOD, KEEPALIVE_PERIOD);

        loop {
            tokio::select! {
                msg = tokio::time::timeout(IDLE_TIMEOUT, read.next()) => {
                    let msg = msg.map_err(|_| MinderError::Timeout("user stream idle"))?;
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()).await,
                        Some(Ok(Message::Ping(payload))) => {
                            write.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Err(tungstenite::Error::ConnectionClosed.into());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(tungstenite::Error::ConnectionClosed.into()),
                    }
                }
                _ = keepalive.tick() => {
                    if let Err(e) =
                        listen_key::keepalive(&self.http, &self.api_key, &listen_key).await
                    {
                        error!(account = %self.alias, error = %e, "Listen-key keepalive failed");
                    }
                }
                _ = self.stop_rx.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Decodes one pushed frame by its `e` discriminator and forwards
    /// the result to the pipeline. Undecodable frames are logged and
    /// dropped; the stream keeps reading.
    async fn dispatch(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                error!(account = %self.alias, error = %e, "Undecodable user-stream frame");
                return;
            }
        };
        let Some(event_type) = value.get("e").and_then(|e| e.as_str()).map(str::to_owned)
        else {
            return;
        };
        let tg_group = self.tg_group.read().clone();

        match event_type.as_str() {
            "executionReport" => match serde_json::from_value::<ExecutionReport>(value) {
                Ok(report) => {
                    let event = OrderEvent::from_report(report, &self.alias, &tg_group);
                    self.events.append(StreamEvent::Order(event)).await;
                }
                Err(e) => error!(account = %self.alias, error = %e, "Bad executionReport"),
            },
            "balanceUpdate" => match serde_json::from_value::<BalanceUpdate>(value) {
                Ok(update) => {
                    let event = BalanceEvent::from_update(update, &self.alias, &tg_group);
                    self.events.append(StreamEvent::Balance(event)).await;
                }
                Err(e) => error!(account = %self.alias, error = %e, "Bad balanceUpdate"),
            },
            "outboundAccountPosition" => {
                match serde_json::from_value::<AccountPosition>(value) {
                    Ok(position) => {
                        // one atomic batch per push, so consumers see the
                        // account snapshot contiguously
                        let batch =
                            AccountPositionEvent::from_position(position, &self.alias, &tg_group)
                                .into_iter()
                                .map(StreamEvent::AccountPosition)
                                .collect();
                        self.events.append_list(batch).await;
                    }
                    Err(e) => {
                        error!(account = %self.alias, error = %e, "Bad outboundAccountPosition");
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stream(events: Arc<EventQueue<StreamEvent>>) -> UserStream {
        let (_stop_tx, stop_rx) = watch::channel(false);
        UserStream {
            alias: "main".into(),
            api_key: "key".into(),
            tg_group: Arc::new(RwLock::new("group-1".into())),
            events,
            http: reqwest::Client::new(),
            tls_config: Arc::new(crate::tls::build_tls_config()),
            stop_rx,
        }
    }

    #[tokio::test]
    async fn execution_report_becomes_order_event() {
        let events = Arc::new(EventQueue::new(16));
        let stream = test_stream(Arc::clone(&events));

        stream
            .dispatch(
                r#"{"e":"executionReport","E":1499405658658,"s":"ETHBTC","S":"BUY",
                    "o":"LIMIT","f":"GTC","q":"1.00000000","p":"0.10264410","P":"0.00000000",
                    "x":"NEW","X":"NEW","r":"NONE","i":4293153,"l":"0.00000000",
                    "z":"0.00000000","L":"0.00000000","n":"0","N":null,"t":-1,
                    "T":1499405658657,"O":1499405658657}"#,
            )
            .await;

        match events.get().await {
            StreamEvent::Order(order) => {
                assert_eq!(order.instrument, "ETHBTC");
                assert_eq!(order.order_side, "BUY");
                assert_eq!(order.order_id, "4293153");
                assert_eq!(order.event_time, "2017-07-07 05:34:18");
                assert_eq!(order.for_alias, "main");
                assert_eq!(order.tg_group, "group-1");
            }
            other => panic!("expected order event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn position_push_is_batched_per_asset() {
        let events = Arc::new(EventQueue::new(16));
        let stream = test_stream(Arc::clone(&events));

        stream
            .dispatch(
                r#"{"e":"outboundAccountPosition","E":1564034571105,"u":1564034571073,
                    "B":[{"a":"ETH","f":"10000.0","l":"0.0"},
                         {"a":"BTC","f":"1.5","l":"0.5"}]}"#,
            )
            .await;

        assert_eq!(events.len(), 2);
        let first = events.get().await;
        let second = events.get().await;
        assert!(matches!(first, StreamEvent::AccountPosition(ref e) if e.instrument == "ETH"));
        assert!(matches!(second, StreamEvent::AccountPosition(ref e) if e.instrument == "BTC"));
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let events = Arc::new(EventQueue::new(16));
        let stream = test_stream(Arc::clone(&events));

        stream.dispatch("{not json").await;
        stream.dispatch(r#"{"e":"executionReport","s":"ETHBTC"}"#).await;
        stream.dispatch(r#"{"listenKey":"abc"}"#).await;

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn tg_group_rewrite_affects_future_events() {
        let events = Arc::new(EventQueue::new(16));
        let stream = test_stream(Arc::clone(&events));
        *stream.tg_group.write() = "group-2".to_string();

        stream
            .dispatch(
                r#"{"e":"balanceUpdate","E":1573200697110,"a":"BTC",
                    "d":"100.00000000","T":1573200697068}"#,
            )
            .await;

        match events.get().await {
            StreamEvent::Balance(balance) => assert_eq!(balance.tg_group, "group-2"),
            other => panic!("expected balance event, got {other:?}"),
        }
    }
}
