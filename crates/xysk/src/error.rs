//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use xysk_config::ConfigError;
use xysk_core::{CoreError, DropReason};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to the bridge at {address}")]
    #[diagnostic(
        code(xysk::connection_failed),
        help(
            "Check that the bridge is powered and on the same network.\n\
             Reason: {reason}\n\
             Try: xysk ping --device {address}"
        )
    )]
    ConnectionFailed { address: String, reason: String },

    #[error("No device configured")]
    #[diagnostic(
        code(xysk::no_device),
        help(
            "Pass --device <host>, set XYSK_DEVICE, or create a profile with: xysk config init\n\
             Expected config at: {path}"
        )
    )]
    NoDevice { path: String },

    // ── Device ───────────────────────────────────────────────────────

    #[error("Device rejected '{action}': {message}")]
    #[diagnostic(code(xysk::rejected))]
    Rejected { action: String, message: String },

    #[error("'{action}' was not sent: {reason}")]
    #[diagnostic(
        code(xysk::dropped),
        help("The socket is closed and this command has no REST equivalent. Retry once connected.")
    )]
    Dropped { action: String, reason: String },

    #[error("HTTP fallback failed: {message}")]
    #[diagnostic(code(xysk::fallback))]
    Fallback { message: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("No response to '{action}' within {millis} ms")]
    #[diagnostic(
        code(xysk::timeout),
        help("Increase the timeout with --timeout or check the bridge's signal strength.")
    )]
    Timeout { action: String, millis: u64 },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(xysk::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(xysk::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: xysk config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(xysk::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(xysk::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Internal ─────────────────────────────────────────────────────

    #[error("Internal error: {0}")]
    #[diagnostic(code(xysk::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::NoDevice { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } | Self::Dropped { .. } => exit_code::REJECTED,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Fallback { .. } | Self::Config(_) | Self::Internal(_) | Self::Io(_) => {
                exit_code::GENERAL
            }
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => {
                CliError::ConnectionFailed { address, reason }
            }

            CoreError::NotConnected { state } => CliError::ConnectionFailed {
                address: "(current device)".into(),
                reason: format!("socket is {state}"),
            },

            CoreError::Timeout { action, timeout_ms } => CliError::Timeout {
                action,
                millis: timeout_ms,
            },

            CoreError::Dropped {
                action,
                reason: DropReason::Invalid(reason),
            } => CliError::Validation {
                field: action,
                reason,
            },

            CoreError::Dropped { action, reason } => CliError::Dropped {
                action,
                reason: reason.to_string(),
            },

            CoreError::Rejected { action, message } => CliError::Rejected { action, message },

            CoreError::InvalidCommand { message } => CliError::Validation {
                field: "command".into(),
                reason: message,
            },

            CoreError::Fallback { message, status: _ } => CliError::Fallback { message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::SessionClosed => CliError::Internal("session shut down".into()),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
