//! Small shared helpers: timestamp formatting, table-name derivation
//! and request-id generation.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Wire format used for every DATETIME column and chat message.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a seconds-resolution UNIX timestamp as a UTC
/// `YYYY-MM-DD HH:MM:SS` string.
///
/// Returns `None` for timestamps outside the representable range.
pub fn format_epoch_secs(secs: i64) -> Option<String> {
    let dt = DateTime::<Utc>::from_timestamp(secs, 0)?;
    Some(dt.format(TIME_FORMAT).to_string())
}

/// Formats a milliseconds-resolution UNIX timestamp (the resolution the
/// exchange pushes) as a UTC `YYYY-MM-DD HH:MM:SS` string.
pub fn format_epoch_ms(ms: i64) -> Option<String> {
    format_epoch_secs(ms / 1_000)
}

/// The current wall-clock time as a UTC `YYYY-MM-DD HH:MM:SS` string.
pub fn now_string() -> String {
    Utc::now().format(TIME_FORMAT).to_string()
}

/// The current wall-clock time as a seconds-resolution UNIX timestamp.
pub fn now_epoch_secs() -> i64 {
    Utc::now().timestamp()
}

/// Derives the per-account table prefix from an account alias: every
/// non-alphanumeric character is stripped and the rest lowercased.
/// Idempotent, so it is safe to apply to an already-derived prefix.
pub fn table_prefix(alias: &str) -> String {
    alias
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Generates a 10-character random alphanumeric request id, used when
/// the operator submits a task without one.
pub fn random_request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_ms_epoch_as_utc_string() {
        assert_eq!(
            format_epoch_ms(1_499_405_658_658).as_deref(),
            Some("2017-07-07 05:34:18")
        );
    }

    #[test]
    fn formats_zero_epoch() {
        assert_eq!(format_epoch_secs(0).as_deref(), Some("1970-01-01 00:00:00"));
    }

    #[test]
    fn table_prefix_strips_and_lowercases() {
        assert_eq!(table_prefix("Main Account #1"), "mainaccount1");
        assert_eq!(table_prefix("btc-whale_42"), "btcwhale42");
    }

    #[test]
    fn table_prefix_is_idempotent() {
        let once = table_prefix("Fancy Alias!");
        assert_eq!(table_prefix(&once), once);
    }

    #[test]
    fn request_ids_are_ten_alphanumeric_chars() {
        for _ in 0..100 {
            let id = random_request_id();
            assert_eq!(id.len(), 10);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
