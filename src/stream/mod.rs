//! Async WebSocket clients for the exchange's streaming endpoints.
//!
//! This module is organized by stream:
//! - [`market`] - the public mini-ticker fan-out feeding the price table
//! - [`user`] - per-account authenticated user-data streams

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::info;
use tungstenite::Message;

use crate::{MinderError, Result};

pub mod market;
pub mod user;

pub use market::MarketStream;
pub use user::{StreamHandle, UserStream};

/// Write half of an exchange WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of an exchange WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// TCP connect plus TLS and WebSocket handshakes must all finish
/// within this window.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Establishes a TLS WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`MinderError`] if the connection or either handshake
/// fails or exceeds [`HANDSHAKE_TIMEOUT`].
pub async fn connect(
    url: &str,
    tls_config: Arc<rustls::ClientConfig>,
) -> Result<(WsWriter, WsReader)> {
    let connector = Connector::Rustls(tls_config);
    let handshake = connect_async_tls_with_config(url, None, false, Some(connector));
    let (ws_stream, _) = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake)
        .await
        .map_err(|_| MinderError::Timeout("websocket handshake"))??;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}
