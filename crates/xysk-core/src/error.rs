// ── Core error types ──
//
// User-facing errors from xysk-core. Most transport and fallback failures
// never surface here: the session turns them into `Dispatch` outcomes or log
// lines. The few operations that return `Result` (connect, request, restore)
// translate `xysk_api::Error` through the `From` impl below.

use thiserror::Error;

use crate::session::DropReason;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Device is not connected (socket {state})")]
    NotConnected { state: String },

    #[error("No response to '{action}' within {timeout_ms} ms")]
    Timeout { action: String, timeout_ms: u64 },

    #[error("Session has shut down")]
    SessionClosed,

    // ── Command errors ───────────────────────────────────────────────
    #[error("Command '{action}' was dropped: {reason}")]
    Dropped { action: String, reason: DropReason },

    #[error("Device rejected '{action}': {message}")]
    Rejected { action: String, message: String },

    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    #[error("HTTP fallback failed: {message}")]
    Fallback { message: String, status: Option<u16> },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn timeout(action: &str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            action: action.to_owned(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<xysk_api::Error> for CoreError {
    fn from(err: xysk_api::Error) -> Self {
        match err {
            xysk_api::Error::ConstructionFailed { url, reason } => CoreError::ConnectionFailed {
                address: url,
                reason,
            },
            xysk_api::Error::NotOpen { state } => CoreError::NotConnected { state },
            xysk_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                address: String::new(),
                reason,
            },
            xysk_api::Error::MalformedFrame { message, .. } => {
                CoreError::Internal(format!("Malformed frame: {message}"))
            }
            xysk_api::Error::Serialization(e) => {
                CoreError::Internal(format!("Serialization error: {e}"))
            }
            xysk_api::Error::Validation { field, reason } => CoreError::InvalidCommand {
                message: format!("{field}: {reason}"),
            },
            xysk_api::Error::Unmapped { action } => CoreError::Dropped {
                action,
                reason: DropReason::NoRoute,
            },
            xysk_api::Error::RequestFailed { url, status } => CoreError::Fallback {
                message: format!("{url} returned HTTP {status}"),
                status: Some(status),
            },
            xysk_api::Error::Http(ref e) => CoreError::Fallback {
                message: err.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            xysk_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            xysk_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
