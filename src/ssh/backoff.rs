//! Backoff for transient accept failures.
//!
//! When the process runs out of file descriptors `accept` fails immediately
//! and would spin. Each consecutive failure doubles the pause, from 100ms up
//! to 3s; any successful accept starts over.

use std::time::Duration;

/// Consecutive-failure backoff for the accept loop.
///
/// ```
/// use sshsnare::ssh::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new();
/// assert_eq!(backoff.on_failure(), Duration::from_millis(100));
/// assert_eq!(backoff.on_failure(), Duration::from_millis(200));
/// backoff.on_success();
/// assert_eq!(backoff.failures(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    failures: u32,
    base: Duration,
    cap: Duration,
}

impl Backoff {
    const BASE: Duration = Duration::from_millis(100);
    const CAP: Duration = Duration::from_secs(3);

    pub fn new() -> Self {
        Self::with_limits(Self::BASE, Self::CAP)
    }

    pub fn with_limits(base: Duration, cap: Duration) -> Self {
        Self {
            failures: 0,
            base,
            cap,
        }
    }

    /// Record a failure and return how long to pause before retrying.
    pub fn on_failure(&mut self) -> Duration {
        // base * 2^failures, saturating, then capped
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.cap);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn on_success(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
