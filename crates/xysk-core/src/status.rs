// ── Observable session state ──

use chrono::{DateTime, Utc};
use serde::Serialize;
use xysk_api::DeviceAddress;

/// Connection status published on the session's `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Point-in-time snapshot of the session internals.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub status: ConnectionStatus,
    pub address: Option<DeviceAddress>,
    pub generation: u64,
    pub ready_state: String,
    pub reconnect_attempt: u32,
    pub reconnect_scheduled: bool,
    pub pending_action: Option<&'static str>,
    pub last_message_at: Option<DateTime<Utc>>,
}
