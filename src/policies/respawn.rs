//! # Respawn debounce policy.
//!
//! [`RespawnPolicy`] decides whether an automatic relaunch counts as a crash loop.
//!
//! A service that dies less than [`RespawnPolicy::window`] after it was started is
//! relaunched with a [`RespawnPolicy::pause`]: the forked child sleeps before exec,
//! which damps restart storms without blocking the supervisor itself.
//!
//! ```text
//! started_at ──► exit after 0.3s ──► uptime < window ──► child sleeps `pause`, then exec
//! started_at ──► exit after 40s  ──► uptime ≥ window ──► exec immediately
//! ```

use std::time::Duration;

/// Crash-loop damping for respawned services.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RespawnPolicy {
    /// A run shorter than this is treated as a rapid respawn.
    pub window: Duration,
    /// Sleep applied in the child before exec on a rapid respawn.
    pub pause: Duration,
}

impl Default for RespawnPolicy {
    /// Returns `window = 1s`, `pause = 500ms`.
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            pause: Duration::from_millis(500),
        }
    }
}

impl RespawnPolicy {
    /// Returns `true` when a service that ran for `uptime` should be paused before relaunch.
    #[inline]
    pub fn is_rapid(&self, uptime: Duration) -> bool {
        uptime < self.window
    }

    /// Returns the pause to apply in the child, if any.
    #[inline]
    pub fn pause_for(&self, rapid: bool) -> Option<Duration> {
        if rapid && self.pause > Duration::ZERO {
            Some(self.pause)
        } else {
            None
        }
    }
}
