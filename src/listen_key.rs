//! Listen-key lifecycle REST calls.
//!
//! A listen key authorizes a subscription to one account's user-data
//! stream. The exchange expires a key 60 minutes after its last touch,
//! so an open stream must PUT-refresh it on a 30-minute cadence.

use tracing::{error, info};

use crate::{MinderError, Result};

const USER_DATA_STREAM_URL: &str = "https://api.binance.com/api/v3/userDataStream";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Requests a fresh listen key for the account behind `api_key`.
///
/// # Errors
///
/// Returns a [`MinderError`] if the request fails or the response does
/// not carry a `listenKey` field; the response body is logged in the
/// latter case so the refusal is visible.
pub async fn create(http: &reqwest::Client, api_key: &str) -> Result<String> {
    let response = http
        .post(USER_DATA_STREAM_URL)
        .header(API_KEY_HEADER, api_key)
        .send()
        .await?
        .error_for_status()?;
    let body: serde_json::Value = response.json().await?;

    match body.get("listenKey").and_then(|k| k.as_str()) {
        Some(key) => {
            info!("Obtained user-data listen key");
            Ok(key.to_string())
        }
        None => {
            error!(body = %body, "listenKey missing from response");
            Err(MinderError::MalformedMessage(
                "missing listenKey in userDataStream response".into(),
            ))
        }
    }
}

/// Extends the lifetime of an existing listen key.
///
/// The acknowledgement body is logged; a successful refresh changes no
/// local state.
///
/// # Errors
///
/// Returns a [`MinderError`] if the request cannot be sent or the
/// response body cannot be read.
pub async fn keepalive(http: &reqwest::Client, api_key: &str, listen_key: &str) -> Result<()> {
    let response = http
        .put(USER_DATA_STREAM_URL)
        .query(&[("listenKey", listen_key)])
        .header(API_KEY_HEADER, api_key)
        .send()
        .await?;
    let body = response.text().await?;
    info!(body = %body, "listen-key keepalive acknowledged");
    Ok(())
}
