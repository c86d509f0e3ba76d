use thiserror::Error;

/// Top-level error type for the `xysk-api` crate.
///
/// Covers every failure mode across the three surfaces: the WebSocket
/// transport, the wire codec, and the HTTP fallback client.
/// `xysk-core` catches these at their origin and turns most of them into
/// dispatch outcomes or log lines.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// The socket could not be constructed (bad URL, wrong scheme).
    #[error("Cannot open WebSocket to {url}: {reason}")]
    ConstructionFailed { url: String, reason: String },

    /// A write was attempted while the socket was not open.
    #[error("WebSocket is not open (state: {state})")]
    NotOpen { state: String },

    /// The handshake or an established socket failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Protocol ────────────────────────────────────────────────────
    /// An inbound frame was not valid JSON (or not a JSON object).
    #[error("Malformed frame: {message}")]
    MalformedFrame { message: String, frame: String },

    /// A command could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A command parameter is outside the range the device accepts.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    // ── HTTP fallback ───────────────────────────────────────────────
    /// The action has no REST equivalent.
    #[error("No HTTP fallback route for action '{action}'")]
    Unmapped { action: String },

    /// The REST call returned a non-success status.
    #[error("HTTP fallback request to {url} failed (HTTP {status})")]
    RequestFailed { url: String, status: u16 },

    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient connectivity error that a
    /// reconnect (or a later retry) might resolve.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) | Self::NotOpen { .. } => true,
            Self::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the error came from the HTTP fallback path.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Self::Unmapped { .. } | Self::RequestFailed { .. } | Self::Http(_)
        )
    }
}
