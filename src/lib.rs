//! Always-on bridge between a spot exchange and its downstream
//! consumers.
//!
//! Streams per-account user data and market-wide tickers from Binance,
//! fans the events out to a MySQL datastore and a Telegram notifier,
//! and runs the periodic P&L / price-change samplers that operators
//! schedule through the external control plane.

pub mod config;
pub mod db;
pub mod error;
pub mod listen_key;
pub mod models;
pub mod pipeline;
pub mod prices;
pub mod reconciler;
pub mod scheduler;
pub mod sink;
pub mod stream;
pub mod supervisor;
pub mod telegram;
pub mod tls;
pub mod util;

pub use error::{MinderError, Result};
