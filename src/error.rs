//! Crate-level error types.
//!
//! [`MinderError`] unifies every error source (configuration, WebSocket,
//! HTTP, JSON, SQL) behind a single enum so callers can match on the
//! variant they care about while still using the `?` operator for easy
//! propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MinderError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum MinderError {
    /// A configuration file could not be found, read, or deserialized,
    /// or a required entry is missing from it.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// An outbound HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A database operation failed.
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    /// A peer sent a response that does not match the documented shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An operation did not complete within its deadline.
    #[error("timed out: {0}")]
    Timeout(&'static str),
}
