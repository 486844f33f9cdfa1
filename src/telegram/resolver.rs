//! Chat-id resolution via the bot update feed.
//!
//! A chat becomes resolvable once someone has messaged the bot (or its
//! group). `getUpdates` returns those messages; group chats are keyed
//! by their title, private chats by the sender's username.

use std::collections::HashMap;

use tracing::info;

use crate::{MinderError, Result};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Fetches the bot update feed and extracts `name -> chat id`
/// mappings.
///
/// # Errors
///
/// Returns a [`MinderError`] if the request fails or the bot server
/// reports an error envelope.
pub async fn fetch_updates(
    http: &reqwest::Client,
    bot_token: &str,
) -> Result<HashMap<String, String>> {
    let url = format!("{TELEGRAM_API_BASE}/bot{bot_token}/getUpdates");
    let body: serde_json::Value = http.get(url).send().await?.json().await?;
    let ids = parse_updates(&body)?;
    info!(chats = ids.len(), "Refreshed chat-id cache");
    Ok(ids)
}

/// Parses a `getUpdates` response body. Entries without a chat (edits,
/// channel posts and the like) are skipped.
pub fn parse_updates(body: &serde_json::Value) -> Result<HashMap<String, String>> {
    if body.get("ok").and_then(|ok| ok.as_bool()) != Some(true) {
        return Err(MinderError::MalformedMessage(
            "bot server reported an error".into(),
        ));
    }

    let mut ids = HashMap::new();
    let Some(result) = body.get("result").and_then(|r| r.as_array()) else {
        return Ok(ids);
    };

    for update in result {
        let Some(chat) = update.get("message").and_then(|m| m.get("chat")) else {
            continue;
        };
        let Some(chat_id) = chat.get("id").and_then(|id| id.as_i64()) else {
            continue;
        };
        let chat_type = chat.get("type").and_then(|t| t.as_str());
        let name = match chat_type {
            Some("group") => chat.get("title").and_then(|t| t.as_str()),
            Some("private") => chat.get("username").and_then(|u| u.as_str()),
            _ => None,
        };
        if let Some(name) = name {
            ids.insert(name.to_string(), chat_id.to_string());
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_group_and_private_chats() {
        let body = json!({
            "ok": true,
            "result": [
                {"update_id": 1, "message": {"chat": {
                    "id": -1001234, "type": "group", "title": "ops-alerts"
                }}},
                {"update_id": 2, "message": {"chat": {
                    "id": 5678, "type": "private", "username": "trader_joe"
                }}},
                {"update_id": 3, "edited_message": {"text": "no chat here"}}
            ]
        });

        let ids = parse_updates(&body).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids["ops-alerts"], "-1001234");
        assert_eq!(ids["trader_joe"], "5678");
    }

    #[test]
    fn error_envelope_is_rejected() {
        let body = json!({"ok": false, "description": "Unauthorized"});
        assert!(parse_updates(&body).is_err());
    }

    #[test]
    fn empty_feed_yields_empty_map() {
        let body = json!({"ok": true, "result": []});
        assert!(parse_updates(&body).unwrap().is_empty());
    }
}
