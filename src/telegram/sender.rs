//! Outbound message senders.
//!
//! Each [`Sender`] owns one HTTPS client to the bot API and a FIFO of
//! pending payloads. A sender created with a payload works its queue
//! down and marks itself completed when the queue runs dry or a network
//! error occurs; the pool then either reuses it (while available) or
//! evicts it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// A sender with this many payloads queued no longer counts as
/// available.
const MAX_PENDING: usize = 10;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One message ready to go out.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Percent-encoded message text.
    pub text: String,
    pub chat_id: String,
}

/// Handle to one sender task.
pub struct Sender {
    tx: mpsc::UnboundedSender<Payload>,
    pending: Arc<AtomicUsize>,
    completed: Arc<AtomicBool>,
}

impl Sender {
    /// Starts a sender working on `first`.
    pub fn spawn(
        tls_config: Arc<rustls::ClientConfig>,
        bot_token: String,
        first: Payload,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(1));
        let completed = Arc::new(AtomicBool::new(false));

        let worker = SenderWorker {
            rx,
            pending: Arc::clone(&pending),
            completed: Arc::clone(&completed),
            tls_config,
            bot_token,
        };
        tokio::spawn(worker.run(first));

        Self {
            tx,
            pending,
            completed,
        }
    }

    /// Whether this sender can take more work: still running, with
    /// fewer than [`MAX_PENDING`] payloads queued.
    pub fn available(&self) -> bool {
        !self.completed.load(Ordering::SeqCst) && self.pending.load(Ordering::SeqCst) < MAX_PENDING
    }

    /// Queues a payload on this sender.
    pub fn push(&self, payload: Payload) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(payload);
    }

    /// Whether the sender has finished its queue (or died on an error).
    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

struct SenderWorker {
    rx: mpsc::UnboundedReceiver<Payload>,
    pending: Arc<AtomicUsize>,
    completed: Arc<AtomicBool>,
    tls_config: Arc<rustls::ClientConfig>,
    bot_token: String,
}

impl SenderWorker {
    async fn run(mut self, first: Payload) {
        let client = match reqwest::Client::builder()
            .use_preconfigured_tls((*self.tls_config).clone())
            .timeout(REQUEST_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Cannot build sender HTTP client");
                self.completed.store(true, Ordering::SeqCst);
                return;
            }
        };

        if !self.deliver(&client, first).await {
            return;
        }

        loop {
            match self.rx.try_recv() {
                Ok(payload) => {
                    if !self.deliver(&client, payload).await {
                        return;
                    }
                }
                Err(TryRecvError::Empty) => {
                    self.completed.store(true, Ordering::SeqCst);
                    // a payload may have slipped in while we were
                    // marking ourselves done
                    match self.rx.try_recv() {
                        Ok(payload) => {
                            self.completed.store(false, Ordering::SeqCst);
                            if !self.deliver(&client, payload).await {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
                Err(TryRecvError::Disconnected) => {
                    self.completed.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }
    }

    /// Sends one payload. Returns `false` when the sender must stop;
    /// the rest of its queue is abandoned, like any sender that dies
    /// mid-connection.
    async fn deliver(&self, client: &reqwest::Client, payload: Payload) -> bool {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        let url = format!(
            "{TELEGRAM_API_BASE}/bot{}/sendMessage?chat_id={}&text={}",
            self.bot_token, payload.chat_id, payload.text
        );

        match client.post(url).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => {
                    debug!(body = %body, "Message delivered");
                    true
                }
                Err(e) => {
                    error!(error = %e, "Failed reading bot response");
                    self.completed.store(true, Ordering::SeqCst);
                    false
                }
            },
            Err(e) => {
                error!(error = %e, "Message delivery failed");
                self.completed.store(true, Ordering::SeqCst);
                false
            }
        }
    }
}
