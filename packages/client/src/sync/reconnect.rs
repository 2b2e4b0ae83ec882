//! Fixed-delay reconnect policy shared by both transports.

use std::time::Duration;

/// Delay applied before every reconnect attempt unless configured otherwise.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Fixed-delay retry policy.
///
/// Every attempt waits the same delay no matter how many failures preceded
/// it; there is no backoff and no attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
    auto_retry: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Retry forever with the given delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            auto_retry: true,
        }
    }

    /// Never retry; a lost connection settles in `Disconnected`
    pub fn disabled() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            auto_retry: false,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Delay before the given reconnect attempt (1-based), or `None` when
    /// automatic retry is off. The attempt number does not change the delay.
    pub fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        self.auto_retry.then_some(self.delay)
    }
}
