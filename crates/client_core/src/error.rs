use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketError {
    /// No bearer token available. Not retried; obtain a fresh token and call
    /// `connect()` again.
    #[error("no access token available")]
    NoToken,
    #[error("invalid server url: {0}")]
    InvalidServerUrl(String),
    #[error("websocket connect failed: {0:#}")]
    Connect(anyhow::Error),
}
