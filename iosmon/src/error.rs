//! Error types shared by the transport, the decoder and the CLI.

use thiserror::Error;

/// A single inbound frame that could not be turned into an [`crate::types::Inbound`].
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no string `action` field")]
    MissingAction,
    #[error("invalid `{action}` payload: {source}")]
    Payload {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// User-supplied endpoint rejected before any connection attempt.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlError {
    #[error("empty WebSocket address")]
    Empty,
    #[error("invalid WebSocket address '{0}'")]
    Invalid(String),
    #[error("unsupported scheme '{0}' (expected ws or wss)")]
    Scheme(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection attempt was cancelled")]
    Cancelled,
}
