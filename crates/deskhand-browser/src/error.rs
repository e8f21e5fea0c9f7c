//! Browser surface errors.

use deskhand_protocols::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// The debugging endpoint could not be reached or did not come up.
    #[error("browser debugging endpoint unavailable: {0}")]
    Unavailable(String),

    /// No debuggable page tab is exposed over the endpoint.
    #[error("no active browser tab is available for protocol attach")]
    NoActiveTab,

    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection closed before a response arrived")]
    SessionClosed,

    #[error("unexpected protocol response: {0}")]
    InvalidResponse(String),

    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl BrowserError {
    /// Stable error code reported back through execution results.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            BrowserError::Unavailable(_)
            | BrowserError::LaunchFailed(_)
            | BrowserError::ConnectionFailed(_)
            | BrowserError::Timeout(_) => ErrorCode::CdpUnavailable,
            BrowserError::NoActiveTab => ErrorCode::CdpNoActiveTab,
            _ => ErrorCode::TransientSurfaceError,
        }
    }

    /// Browser surface failures are connection-shaped and worth retrying.
    pub fn retryable(&self) -> bool {
        true
    }
}
