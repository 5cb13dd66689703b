//! # Backoff policy for retrying `fork(2)`.
//!
//! [`BackoffPolicy`] controls how long the launcher sleeps between fork attempts
//! that failed with a transient resource error (`EAGAIN`, `ENOMEM`).
//! It is parameterized by:
//! - [`BackoffPolicy::step`] the delay unit, multiplied by the retry number;
//! - [`BackoffPolicy::retries`] how many retries are made before giving up.
//!
//! The delay before retry `n` (1-based) is `step × n`. The sleep is synchronous:
//! the supervisor has nothing better to do while the system is out of processes.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use dirvisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy {
//!     step: Duration::from_secs(2),
//!     retries: 3,
//! };
//!
//! assert_eq!(backoff.next(1), Some(Duration::from_secs(2)));
//! assert_eq!(backoff.next(3), Some(Duration::from_secs(6)));
//! assert_eq!(backoff.next(4), None);
//! ```

use std::time::Duration;

/// Fork retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay unit; retry `n` waits `step × n`.
    pub step: Duration,
    /// Number of retries after the first failed attempt.
    pub retries: u32,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `step = 2s`;
    /// - `retries = 3` (waits of 2s, 4s, 6s).
    fn default() -> Self {
        Self {
            step: Duration::from_secs(2),
            retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Returns the delay before retry `retry` (1-based), or `None` once the retries are used up.
    pub fn next(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.retries {
            return None;
        }
        Some(self.step.saturating_mul(retry))
    }
}
