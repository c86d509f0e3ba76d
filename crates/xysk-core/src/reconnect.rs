// ── Reconnection policy ──
//
// Bounded exponential backoff plus a single-slot timer. The session actor
// owns one `ReconnectPolicy` and one `ReconnectTimer`; scheduling always
// replaces the slot, so at most one reconnect can ever be outstanding.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration.
///
/// `delay(n) = min(initial_delay * factor^n, max_delay)`, where `n` counts
/// consecutive failed attempts since the last successful open.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Growth factor per attempt. Default: 1.5.
    pub factor: f64,

    /// Upper bound on backoff delay. Default: 5s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            factor: 1.5,
            max_delay: Duration::from_secs(5),
            max_retries: None,
        }
    }
}

/// Backoff delay for a zero-based attempt number.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * config.factor.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64()).max(0.0);
    Duration::from_secs_f64(capped)
}

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// Attempt counter driving [`calculate_backoff`].
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay for the next attempt, advancing the counter.
    ///
    /// Returns `None` once `max_retries` attempts have been handed out.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self
            .config
            .max_retries
            .is_some_and(|max| self.attempt >= max)
        {
            return None;
        }
        let delay = calculate_backoff(self.attempt, &self.config);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Forget past failures (after a successful open or a manual connect).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

// ── ReconnectTimer ───────────────────────────────────────────────────

/// A single optional deadline.
///
/// [`fired`](Self::fired) is cancel-safe: dropping it inside `select!` keeps
/// the deadline in place for the next poll.
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ReconnectTimer {
    /// Arm the timer, replacing any existing deadline.
    pub fn schedule(&mut self, delay: Duration) {
        self.sleep = Some(Box::pin(tokio::time::sleep_until(Instant::now() + delay)));
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_pending(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolves when the armed deadline passes, disarming the timer.
    /// Never resolves while disarmed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.await;
                self.sleep = None;
            }
            None => future::pending().await,
        }
    }
}
