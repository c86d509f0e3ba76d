// ── Runtime session configuration ──
//
// These types describe *how* a session talks to its device. They never
// touch disk: the CLI builds a `SessionConfig` (usually from a profile in
// xysk-config) and hands it in.

use std::time::Duration;

use url::Url;
use xysk_api::{HttpConfig, PageOrigin};

use crate::reconnect::ReconnectConfig;

/// Interval of the keep-alive `ping` while the socket is open.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Floor for the auto-refresh interval.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Origin used for `localhost` resolution and ws/wss selection.
    pub origin: PageOrigin,
    pub reconnect: ReconnectConfig,
    /// HTTP client settings for the REST fallback.
    pub http: HttpConfig,
    /// Explicit REST base URL. Derived from the device address when `None`.
    pub http_base: Option<Url>,
    /// `None` disables keep-alive pings.
    pub keepalive_interval: Option<Duration>,
    /// Periodic status refresh. `None` (the default) disables it.
    pub refresh_interval: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            origin: PageOrigin::default(),
            reconnect: ReconnectConfig::default(),
            http: HttpConfig::default(),
            http_base: None,
            keepalive_interval: Some(DEFAULT_KEEPALIVE),
            refresh_interval: None,
        }
    }
}

/// Clamp a requested refresh interval to [`MIN_REFRESH_INTERVAL`].
pub fn clamp_refresh(interval: Duration) -> Duration {
    interval.max(MIN_REFRESH_INTERVAL)
}
